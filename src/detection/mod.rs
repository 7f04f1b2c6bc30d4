pub mod annotate;
pub mod contours;
pub mod fallback;
pub mod heuristic;
pub mod labels;
pub mod model;
pub mod preprocessing;
pub mod rten_backend;
pub mod severity;
pub mod steps;
pub mod summary;

use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::DetectorConfig;
use crate::error::{DecodeError, LeakError, Result};
use crate::models::DetectionResult;
use crate::pipeline::DebugConfig;
use fallback::{FallbackReason, fallback_reason};
use heuristic::HeuristicDetector;
use model::{ModelDetections, ModelDetector, ModelLoader};
use rten_backend::RtenLoader;

/// Main detection pipeline orchestrator
///
/// decode -> model -> fallback decision -> (heuristics) -> summary + annotation.
/// Safe to share between threads; the only state kept across calls is the
/// lazily loaded model handle.
pub struct LeakDetector {
    config: DetectorConfig,
    model: ModelDetector,
    heuristic: HeuristicDetector,
}

impl LeakDetector {
    /// Detector backed by `.rten` models at the configured paths.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let loader = Arc::new(RtenLoader::new(config.class_names.clone()));
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: DetectorConfig, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: ModelDetector::new(&config, loader),
            heuristic: HeuristicDetector::new(),
            config,
        })
    }

    /// Enable debug mode with output directory for intermediate cue masks.
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        let debug = DebugConfig::new(output_dir)?;
        self.heuristic = self.heuristic.with_debug(Some(debug));
        Ok(self)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelDetector {
        &self.model
    }

    /// Run the full pipeline on an encoded image.
    pub fn detect(&self, image_bytes: &[u8]) -> Result<DetectionResult> {
        let image = decode_image(image_bytes)?;
        self.detect_image(&image)
    }

    /// Run the pipeline on already decoded pixels.
    pub fn detect_image(&self, image: &RgbImage) -> Result<DetectionResult> {
        let (model_output, model_failed) = match self.model.detect(image) {
            Ok(output) => (output, false),
            Err(LeakError::InferenceFailed(reason)) => {
                error!("Model inference failed. Falling back to heuristic detector. Error: {}", reason);
                (ModelDetections::default(), true)
            }
            Err(e) => return Err(e),
        };

        let reason = fallback_reason(
            &model_output.boxes,
            model_output.label_set.as_slice(),
            model_failed,
            self.config.enable_heuristic_fallback,
        );
        let heuristic = reason.map(|reason| {
            if reason == FallbackReason::NonLeakModel {
                warn!("Current model appears non-leak-specific. Using heuristic fallback for leak detection.");
            }
            self.heuristic.detect(image)
        });

        let result = summary::build(image, model_output.boxes, heuristic)?;
        info!(
            leak_type = %result.leak_type,
            severity = %result.severity_level,
            confidence = result.confidence_score,
            detections = result.detections.len(),
            source = ?result.source,
            fallback = ?reason,
            "leak detection finished"
        );
        Ok(result)
    }

    /// Run a detection on the blocking worker pool so async request handlers
    /// are not stalled by inference.
    pub async fn detect_blocking_task(self: Arc<Self>, image_bytes: Vec<u8>) -> Result<DetectionResult> {
        tokio::task::spawn_blocking(move || self.detect(&image_bytes)).await?
    }
}

/// Reject empty buffers, then decode any supported raster format to RGB.
pub fn decode_image(image_bytes: &[u8]) -> Result<RgbImage> {
    if image_bytes.is_empty() {
        return Err(DecodeError::Empty.into());
    }
    let img = image::load_from_memory(image_bytes).map_err(DecodeError::Unreadable)?;
    Ok(preprocessing::to_rgb(&img))
}
