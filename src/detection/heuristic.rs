//! Colour and edge cues that stand in for the learned detector.
//!
//! Three independent cues run over the same image: orange-brown tones for
//! corrosion, blue/cyan or bright reflective regions for escaping water,
//! and dark edges for cracks. Each cue is a [`MaskPipeline`] followed by
//! the shared box-from-mask policy in [`contours`](super::contours).

use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

use crate::detection::contours::{BoxPolicy, boxes_from_mask};
use crate::detection::preprocessing;
use crate::detection::steps::*;
use crate::models::{BoundingBox, LeakCategory, sort_by_confidence};
use crate::pipeline::{DebugConfig, MaskContext, MaskPipeline};

/// Upper bound on boxes returned across all cues.
pub const MAX_HEURISTIC_BOXES: usize = 5;

/// Water coverage at or above this fraction reads as a burst rather than a joint leak.
pub const BURST_COVERAGE_RATIO: f64 = 0.12;

pub struct HeuristicDetector {
    rust: MaskPipeline,
    water: MaskPipeline,
    crack: MaskPipeline,
    rust_policy: BoxPolicy,
    burst_policy: BoxPolicy,
    joint_policy: BoxPolicy,
    crack_policy: BoxPolicy,
    debug: Option<DebugConfig>,
}

impl HeuristicDetector {
    pub fn new() -> Self {
        Self {
            rust: build_rust_pipeline(),
            water: build_water_pipeline(),
            crack: build_crack_pipeline(),
            rust_policy: BoxPolicy::new(0.56, 0.0015),
            burst_policy: BoxPolicy::new(0.62, 0.003),
            joint_policy: BoxPolicy::new(0.54, 0.003),
            crack_policy: BoxPolicy::new(0.53, 0.0012),
            debug: None,
        }
    }

    /// Dump every intermediate cue mask under `debug.output_dir`
    pub fn with_debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.debug = debug;
        self
    }

    /// Pooled candidates from all cues, confidence-descending, at most
    /// [`MAX_HEURISTIC_BOXES`]. Never fails; an image with no cues yields
    /// an empty list.
    pub fn detect(&self, image: &RgbImage) -> Vec<BoundingBox> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }

        let context = MaskContext::new(image).with_debug(self.debug.as_ref());
        let image_area = context.image_area();

        let rust_mask = self.rust.run(&context);
        let rust_boxes = boxes_from_mask(&rust_mask, LeakCategory::RustCorrosion, image_area, &self.rust_policy);

        let water_mask = self.water.run(&context);
        let water_ratio = preprocessing::count_nonzero(&water_mask) as f64 / image_area as f64;
        let (water_label, water_policy) = if water_ratio >= BURST_COVERAGE_RATIO {
            (LeakCategory::BurstPipe, &self.burst_policy)
        } else {
            (LeakCategory::JointLeakage, &self.joint_policy)
        };
        let water_boxes = boxes_from_mask(&water_mask, water_label, image_area, water_policy);

        let crack_mask = self.crack.run(&context);
        let crack_boxes = boxes_from_mask(&crack_mask, LeakCategory::PipeCrack, image_area, &self.crack_policy);

        debug!(
            rust = rust_boxes.len(),
            water = water_boxes.len(),
            water_ratio,
            water_label = %water_label,
            crack = crack_boxes.len(),
            "heuristic cue candidates"
        );

        let mut all: Vec<BoundingBox> = rust_boxes
            .into_iter()
            .chain(water_boxes)
            .chain(crack_boxes)
            .collect();
        sort_by_confidence(&mut all);
        all.truncate(MAX_HEURISTIC_BOXES);
        all
    }
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Orange-brown tones, despeckled and gap-filled
pub fn build_rust_pipeline() -> MaskPipeline {
    MaskPipeline::new("Rust Cue")
        .add_step(Arc::new(HsvRangeStep {
            name: "Orange Brown",
            lower: [5, 60, 30],
            upper: [25, 255, 220],
            combine: Combine::Replace,
        }))
        .add_step(Arc::new(OpenStep { radius: 1 }))
        .add_step(Arc::new(CloseStep { radius: 2 }))
}

/// Blue/cyan wet regions plus bright low-saturation reflections
pub fn build_water_pipeline() -> MaskPipeline {
    MaskPipeline::new("Water Cue")
        .add_step(Arc::new(HsvRangeStep {
            name: "Blue Cyan",
            lower: [80, 35, 25],
            upper: [140, 255, 255],
            combine: Combine::Replace,
        }))
        .add_step(Arc::new(HsvRangeStep {
            name: "Reflective",
            lower: [0, 0, 130],
            upper: [180, 70, 255],
            combine: Combine::Union,
        }))
        .add_step(Arc::new(OpenStep { radius: 1 }))
        .add_step(Arc::new(CloseStep { radius: 3 }))
}

/// Thin dark linear structures: edges that sit on dark pixels
pub fn build_crack_pipeline() -> MaskPipeline {
    MaskPipeline::new("Crack Cue")
        .add_step(Arc::new(EdgeDetectionStep {
            low_threshold: 80.0,
            high_threshold: 180.0,
            combine: Combine::Replace,
        }))
        .add_step(Arc::new(GrayRangeStep {
            lower: 0,
            upper: 55,
            combine: Combine::Intersect,
        }))
        .add_step(Arc::new(DilateStep { radius: 1, iterations: 1 }))
}
