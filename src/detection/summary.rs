use image::RgbImage;

use crate::detection::annotate::annotate;
use crate::detection::severity::severity;
use crate::error::Result;
use crate::models::{BoundingBox, DetectionResult, DetectionSource, LeakCategory, round_to, sort_by_confidence};

/// Assemble the final diagnosis.
///
/// When `heuristic` is present it replaces the model boxes outright (the
/// arbiter only consults it when the model found nothing). Decisions use the
/// unrounded confidences; rounding happens on the way out.
pub fn build(
    image: &RgbImage,
    model_boxes: Vec<BoundingBox>,
    heuristic: Option<Vec<BoundingBox>>,
) -> Result<DetectionResult> {
    let (mut detections, source) = match heuristic {
        Some(boxes) => (boxes, DetectionSource::Heuristic),
        None => (model_boxes, DetectionSource::Model),
    };
    sort_by_confidence(&mut detections);

    let (leak_type, confidence, severity_level) = match detections.first() {
        Some(best) => (best.label, best.confidence, severity(best.label, best.confidence)),
        None => (LeakCategory::NoLeak, 0.0, severity(LeakCategory::NoLeak, 0.0)),
    };

    let detections: Vec<BoundingBox> = detections.iter().map(BoundingBox::rounded).collect();
    let annotated_image = annotate(image, &detections)?;

    Ok(DetectionResult {
        leak_type,
        severity_level,
        confidence_score: round_to(confidence, 4),
        recommended_solution: leak_type.recommended_solution(),
        detections,
        annotated_image,
        source,
    })
}
