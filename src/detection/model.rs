use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::detection::labels;
use crate::error::{LeakError, Result};
use crate::models::{BoundingBox, RawBox};

/// Knobs passed to every prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
    pub max_detections: usize,
    /// Test-time augmentation: also predict on a mirrored view.
    pub augment: bool,
}

impl From<&DetectorConfig> for InferenceParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            image_size: config.image_size,
            max_detections: config.max_detections,
            augment: config.use_tta,
        }
    }
}

/// A loaded detection model.
///
/// Shared across concurrent calls once loaded, so `predict` takes `&self`.
pub trait InferenceBackend: Send + Sync {
    /// Class vocabulary, indexed by `RawBox::class_id`.
    fn class_names(&self) -> &[String];

    fn predict(&self, image: &RgbImage, params: &InferenceParams) -> anyhow::Result<Vec<RawBox>>;
}

/// Turns a model file into a backend.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Arc<dyn InferenceBackend>>;
}

/// Usable model output for one image.
#[derive(Debug, Clone, Default)]
pub struct ModelDetections {
    /// Normalized boxes, confidence-descending.
    pub boxes: Vec<BoundingBox>,
    /// The model's full class vocabulary.
    pub label_set: Vec<String>,
    /// Raw boxes discarded because their label is not a leak class.
    pub dropped: usize,
}

/// Pick the model file to load: the primary path if it exists, else the
/// fallback path, else neither.
pub fn resolve_model_path(primary: &Path, fallback: &Path) -> Result<PathBuf> {
    if primary.exists() {
        return Ok(primary.to_path_buf());
    }
    if fallback.exists() {
        warn!(
            "Detection model not found at '{}'. Falling back to '{}'.",
            primary.display(),
            fallback.display()
        );
        return Ok(fallback.to_path_buf());
    }
    Err(LeakError::ModelUnavailable {
        primary: primary.to_path_buf(),
        fallback: fallback.to_path_buf(),
    })
}

/// The learned detector: lazily loaded model handle plus label normalization.
pub struct ModelDetector {
    primary_path: PathBuf,
    fallback_path: PathBuf,
    params: InferenceParams,
    loader: Arc<dyn ModelLoader>,
    // Loaded once on first use; the Arc is cloned out so the lock is not
    // held during inference.
    handle: Mutex<Option<Arc<dyn InferenceBackend>>>,
}

impl ModelDetector {
    pub fn new(config: &DetectorConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            primary_path: config.model_path.clone(),
            fallback_path: config.fallback_model_path.clone(),
            params: InferenceParams::from(config),
            loader,
            handle: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    pub fn is_loaded(&self) -> bool {
        self.lock_handle().is_some()
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn InferenceBackend>>> {
        // A panic while loading leaves the slot empty, which is still valid.
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shared model handle, loading it on the first call.
    ///
    /// Fails with `ModelUnavailable` when no model file exists, and with
    /// `InferenceFailed` when the file exists but cannot be loaded; the
    /// next call retries the load.
    pub fn handle(&self) -> Result<Arc<dyn InferenceBackend>> {
        let mut slot = self.lock_handle();
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }

        let path = resolve_model_path(&self.primary_path, &self.fallback_path)?;
        info!("Loading detection model from {}", path.display());
        let backend = self
            .loader
            .load(&path)
            .map_err(|e| LeakError::InferenceFailed(format!("failed to load {}: {e:#}", path.display())))?;
        info!(classes = backend.class_names().len(), "Detection model loaded");

        *slot = Some(backend.clone());
        Ok(backend)
    }

    /// Run the model and keep only boxes whose label is a leak class.
    pub fn detect(&self, image: &RgbImage) -> Result<ModelDetections> {
        let backend = self.handle()?;
        let raw = backend
            .predict(image, &self.params)
            .map_err(|e| LeakError::InferenceFailed(format!("{e:#}")))?;

        Ok(normalize_boxes(raw, backend.class_names()))
    }
}

/// Map raw boxes onto leak categories, dropping any with an unknown label.
pub fn normalize_boxes(raw: Vec<RawBox>, class_names: &[String]) -> ModelDetections {
    let total = raw.len();
    let mut boxes: Vec<BoundingBox> = raw
        .into_iter()
        .filter_map(|r| {
            let raw_label = class_names
                .get(r.class_id)
                .cloned()
                .unwrap_or_else(|| r.class_id.to_string());
            let label = labels::normalize(&raw_label)?;
            Some(BoundingBox {
                x1: r.x1,
                y1: r.y1,
                x2: r.x2,
                y2: r.y2,
                confidence: r.confidence.clamp(0.0, 1.0),
                label,
            })
        })
        .collect();
    crate::models::sort_by_confidence(&mut boxes);

    let dropped = total - boxes.len();
    if dropped > 0 {
        debug!(dropped, kept = boxes.len(), "discarded model boxes without a leak label");
    }

    ModelDetections {
        boxes,
        label_set: class_names.to_vec(),
        dropped,
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first,
/// capped at `max_detections`.
pub fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32, max_detections: usize) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<RawBox> = Vec::new();

    'outer: for b in boxes {
        for k in &kept {
            if k.class_id == b.class_id && k.iou(&b) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(b);
        if kept.len() >= max_detections {
            break;
        }
    }
    kept
}

/// Map boxes predicted on a horizontally flipped image back onto the original.
pub fn unmirror(boxes: Vec<RawBox>, image_width: u32) -> Vec<RawBox> {
    let w = image_width as f32;
    boxes
        .into_iter()
        .map(|b| RawBox {
            x1: w - b.x2,
            x2: w - b.x1,
            ..b
        })
        .collect()
}

/// Run `predict_once` on the image and, with augmentation, on its mirror;
/// pool and suppress the results.
pub fn predict_with_augmentation<F>(image: &RgbImage, params: &InferenceParams, predict_once: F) -> anyhow::Result<Vec<RawBox>>
where
    F: Fn(&RgbImage) -> anyhow::Result<Vec<RawBox>>,
{
    let mut boxes = predict_once(image)?;
    if params.augment {
        let mirrored = image::imageops::flip_horizontal(image);
        boxes.extend(unmirror(predict_once(&mirrored)?, image.width()));
    }
    Ok(non_max_suppression(boxes, params.iou_threshold, params.max_detections))
}
