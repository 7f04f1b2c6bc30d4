use anyhow::{Result, anyhow, bail};
use image::RgbImage;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::detection::model::{InferenceBackend, InferenceParams, ModelLoader, predict_with_augmentation};
use crate::detection::preprocessing::{self, Letterbox};
use crate::models::RawBox;

/// Loads YOLOv8-style detectors converted to the `.rten` format.
#[derive(Debug, Clone, Default)]
pub struct RtenLoader {
    /// Used when the model has no `.names` sidecar.
    pub class_names: Vec<String>,
}

impl RtenLoader {
    pub fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }
}

/// `<model>.names` next to the model file, one class per line.
pub fn sidecar_names_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("names")
}

pub fn read_class_names(model_path: &Path) -> Result<Option<Vec<String>>> {
    let path = sidecar_names_path(model_path);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(Some(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    ))
}

impl ModelLoader for RtenLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn InferenceBackend>> {
        let model = Model::load_file(path)
            .map_err(|e| anyhow!("failed to load model {}: {}", path.display(), e))?;
        let class_names = read_class_names(path)?.unwrap_or_else(|| self.class_names.clone());
        Ok(Arc::new(RtenBackend { model, class_names }))
    }
}

pub struct RtenBackend {
    model: Model,
    class_names: Vec<String>,
}

impl RtenBackend {
    fn predict_once(&self, image: &RgbImage, params: &InferenceParams) -> Result<Vec<RawBox>> {
        let (input_image, letterbox) = preprocessing::letterbox(image, params.image_size);
        let input = to_nchw_tensor(&input_image);

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow!("model run failed: {}", e))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| anyhow!("model output is not a 3-d f32 tensor: {:?}", e))?;

        let shape = output.shape();
        let (dim1, dim2) = (shape[1], shape[2]);
        // YOLOv8 exports are [1, 4 + classes, anchors]; some tools transpose.
        let channels_first = dim1 <= dim2;
        let (num_attrs, num_anchors) = if channels_first { (dim1, dim2) } else { (dim2, dim1) };
        if num_attrs < 5 {
            bail!("model output has {} attributes per anchor, expected at least 5", num_attrs);
        }
        if !self.class_names.is_empty() && self.class_names.len() != num_attrs - 4 {
            debug!(
                names = self.class_names.len(),
                classes = num_attrs - 4,
                "class name count differs from model output"
            );
        }

        let data: Vec<f32> = output.iter().copied().collect();
        let layout = OutputLayout { num_attrs, num_anchors, channels_first };
        Ok(decode_yolo(&data, layout, params.conf_threshold, &letterbox, image.dimensions()))
    }
}

impl InferenceBackend for RtenBackend {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn predict(&self, image: &RgbImage, params: &InferenceParams) -> Result<Vec<RawBox>> {
        predict_with_augmentation(image, params, |img| self.predict_once(img, params))
    }
}

fn to_nchw_tensor(image: &RgbImage) -> NdTensor<f32, 4> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let plane = w * h;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let idx = y as usize * w + x as usize;
        for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }
    NdTensor::from_data([1, 3, h, w], data)
}

/// Shape of a detector output with its batch dimension removed.
#[derive(Debug, Clone, Copy)]
pub struct OutputLayout {
    pub num_attrs: usize,
    pub num_anchors: usize,
    /// `[attrs, anchors]` when true, `[anchors, attrs]` otherwise.
    pub channels_first: bool,
}

impl OutputLayout {
    fn value(&self, data: &[f32], attr: usize, anchor: usize) -> f32 {
        let idx = if self.channels_first {
            attr * self.num_anchors + anchor
        } else {
            anchor * self.num_attrs + attr
        };
        data.get(idx).copied().unwrap_or(0.0)
    }
}

/// Decode `(cx, cy, w, h, class scores...)` rows into boxes on the source
/// image, keeping each anchor's best class when it clears `conf_threshold`.
pub fn decode_yolo(
    data: &[f32],
    layout: OutputLayout,
    conf_threshold: f32,
    letterbox: &Letterbox,
    (width, height): (u32, u32),
) -> Vec<RawBox> {
    let (max_x, max_y) = (width as f32, height as f32);
    let mut out = Vec::new();

    for anchor in 0..layout.num_anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..layout.num_attrs - 4 {
            let score = layout.value(data, 4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < conf_threshold {
            continue;
        }

        let cx = layout.value(data, 0, anchor);
        let cy = layout.value(data, 1, anchor);
        let bw = layout.value(data, 2, anchor);
        let bh = layout.value(data, 3, anchor);
        let (x1, y1) = letterbox.unmap(cx - bw / 2.0, cy - bh / 2.0);
        let (x2, y2) = letterbox.unmap(cx + bw / 2.0, cy + bh / 2.0);

        let b = RawBox {
            x1: x1.clamp(0.0, max_x),
            y1: y1.clamp(0.0, max_y),
            x2: x2.clamp(0.0, max_x),
            y2: y2.clamp(0.0, max_y),
            confidence: best_score,
            class_id: best_class,
        };
        if b.x2 > b.x1 && b.y2 > b.y1 {
            out.push(b);
        }
    }

    out
}
