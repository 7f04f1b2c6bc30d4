use image::{ImageBuffer, Rgb, RgbImage};
use leakscan::{DetectorConfig, InferenceBackend, InferenceParams, LeakDetector, ModelLoader, RawBox};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Neutral mid-grey: no colour cue, not dark, not reflective.
pub const BACKGROUND: Rgb<u8> = Rgb([90, 90, 90]);
/// Saturated blue inside the water band.
pub const WATER: Rgb<u8> = Rgb([30, 60, 200]);
/// Orange-brown inside the corrosion band.
pub const RUST: Rgb<u8> = Rgb([150, 75, 20]);

pub fn blank_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_pixel(width, height, BACKGROUND)
}

pub fn paint(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, color);
        }
    }
}

/// 200x200 frame with a 100x60 water patch (15% coverage).
pub fn burst_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    paint(&mut img, 50, 70, 100, 60, WATER);
    img
}

/// 200x200 frame with a 40x40 water patch (4% coverage).
pub fn joint_leak_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    paint(&mut img, 20, 20, 40, 40, WATER);
    img
}

/// 200x200 frame with a 50x50 rust patch.
pub fn rust_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    paint(&mut img, 100, 100, 50, 50, RUST);
    img
}

/// Water pooled along the bottom edge, touching three sides of the frame.
pub fn pooled_water_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    paint(&mut img, 0, 160, 200, 40, WATER);
    img
}

/// Rust covering the top-left corner.
pub fn corner_rust_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    paint(&mut img, 0, 0, 60, 60, RUST);
    img
}

/// A 120x5 black line on a lighter grey pipe surface.
pub fn crack_image() -> RgbImage {
    let mut img = ImageBuffer::from_pixel(200, 200, Rgb([120, 120, 120]));
    paint(&mut img, 40, 100, 120, 5, Rgb([0, 0, 0]));
    img
}

/// More separate rust and water patches than the heuristic keeps.
pub fn busy_image() -> RgbImage {
    let mut img = blank_image(200, 200);
    for i in 0..4 {
        for j in 0..2 {
            paint(&mut img, 10 + i * 45, 10 + j * 45, 18 + i * 2, 18 + j * 2, RUST);
        }
    }
    for i in 0..4 {
        paint(&mut img, 10 + i * 45, 120, 16 + i, 16, WATER);
    }
    img
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

pub fn raw_box(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> RawBox {
    RawBox { x1, y1, x2, y2, confidence, class_id }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn leak_names() -> Vec<String> {
    names(&["pipe_crack", "burst_pipe", "joint_leakage", "rust_corrosion"])
}

pub fn coco_names() -> Vec<String> {
    names(&["person", "bicycle", "car"])
}

/// What a scripted backend does on every prediction.
#[derive(Clone)]
pub enum Behavior {
    Boxes(Vec<RawBox>),
    Fail,
}

pub struct ScriptedBackend {
    pub class_names: Vec<String>,
    pub behavior: Behavior,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(class_names: Vec<String>, behavior: Behavior) -> Self {
        Self {
            class_names,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn predict(&self, _image: &RgbImage, _params: &InferenceParams) -> anyhow::Result<Vec<RawBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Boxes(boxes) => Ok(boxes.clone()),
            Behavior::Fail => anyhow::bail!("backend exploded"),
        }
    }
}

/// Hands out one shared backend and counts how often it was asked to load.
pub struct ScriptedLoader {
    pub backend: Option<Arc<ScriptedBackend>>,
    pub loads: AtomicUsize,
    pub load_delay: Duration,
}

impl ScriptedLoader {
    pub fn new(backend: ScriptedBackend) -> Arc<Self> {
        Self::slow(backend, Duration::ZERO)
    }

    pub fn slow(backend: ScriptedBackend, load_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            backend: Some(Arc::new(backend)),
            loads: AtomicUsize::new(0),
            load_delay,
        })
    }

    /// Every load fails, as with corrupt weights.
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            backend: None,
            loads: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
        })
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn predict_count(&self) -> usize {
        self.backend
            .as_ref()
            .map(|b| b.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, _path: &Path) -> anyhow::Result<Arc<dyn InferenceBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        match &self.backend {
            Some(backend) => Ok(backend.clone()),
            None => anyhow::bail!("corrupt weights"),
        }
    }
}

/// Creates a config pointing at an existing model file in a temp directory.
/// Returns both the config and the temp directory (which must be kept alive).
pub fn config_with_model() -> (DetectorConfig, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let model = dir.path().join("leaks.rten");
    std::fs::write(&model, b"").expect("Failed to create model file");
    let config = DetectorConfig {
        model_path: model,
        fallback_model_path: dir.path().join("missing.rten"),
        ..DetectorConfig::default()
    };
    (config, dir)
}

pub fn detector(config: DetectorConfig, loader: Arc<ScriptedLoader>) -> LeakDetector {
    LeakDetector::with_loader(config, loader).expect("Failed to build detector")
}
