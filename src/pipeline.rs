use image::{GrayImage, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::detection::preprocessing::{self, HsvImage};

/// Debug configuration for mask pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> anyhow::Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }
        Ok(Self { output_dir })
    }
}

/// Per-image views shared by every step of every cue.
pub struct MaskContext<'a> {
    pub rgb: &'a RgbImage,
    pub hsv: HsvImage,
    pub gray: GrayImage,
    pub debug: Option<&'a DebugConfig>,
}

impl<'a> MaskContext<'a> {
    pub fn new(rgb: &'a RgbImage) -> Self {
        Self {
            rgb,
            hsv: preprocessing::to_hsv(rgb),
            gray: preprocessing::to_grayscale(rgb),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Option<&'a DebugConfig>) -> Self {
        self.debug = debug;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    /// Pixel count, never zero.
    pub fn image_area(&self) -> u64 {
        let (w, h) = self.dimensions();
        (w as u64 * h as u64).max(1)
    }
}

/// A single transformation of a binary mask (0 = background, 255 = foreground).
pub trait MaskStep: Send + Sync {
    fn process(&self, mask: GrayImage, context: &MaskContext) -> GrayImage;

    /// Human-readable name for this step (used in logs and debug file names)
    fn name(&self) -> &str;
}

/// Ordered list of mask steps that turns an image into one cue mask.
#[derive(Clone)]
pub struct MaskPipeline {
    name: String,
    steps: Vec<Arc<dyn MaskStep>>,
}

impl MaskPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_step(mut self, step: Arc<dyn MaskStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn MaskStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step, starting from an all-background mask.
    pub fn run(&self, context: &MaskContext) -> GrayImage {
        self.run_partial(context, self.steps.len())
    }

    /// Run only the first `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, context: &MaskContext, num_steps: usize) -> GrayImage {
        let (width, height) = context.dimensions();
        let mut mask = GrayImage::new(width, height);

        for (idx, step) in self.steps.iter().take(num_steps).enumerate() {
            mask = step.process(mask, context);
            debug!(
                cue = %self.name,
                step = step.name(),
                foreground = preprocessing::count_nonzero(&mask),
                "mask step done"
            );
            if let Some(debug_config) = context.debug {
                self.save_debug_output(debug_config, idx, step.name(), &mask);
            }
        }

        mask
    }

    fn save_debug_output(&self, debug_config: &DebugConfig, idx: usize, step_name: &str, mask: &GrayImage) {
        let cue_dir = debug_config
            .output_dir
            .join(self.name.to_lowercase().replace(' ', "_"));
        let filename = format!("{:02}_{}.png", idx + 1, step_name.to_lowercase().replace(' ', "_"));

        let saved = std::fs::create_dir_all(&cue_dir)
            .map_err(anyhow::Error::from)
            .and_then(|_| mask.save(cue_dir.join(&filename)).map_err(anyhow::Error::from));
        match saved {
            Ok(()) => debug!("Debug: saved {}/{}", cue_dir.display(), filename),
            Err(e) => warn!("Failed to save debug mask {}: {}", filename, e),
        }
    }
}
