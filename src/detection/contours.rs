use image::GrayImage;
use image::imageops;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;

use crate::models::{BoundingBox, LeakCategory, sort_by_confidence};

/// Heuristic confidences never reach certainty.
pub const MAX_HEURISTIC_CONFIDENCE: f32 = 0.88;

/// Weight of the covered-area fraction in a heuristic confidence.
pub const AREA_CONFIDENCE_GAIN: f32 = 3.0;

/// Outer boundary of one connected foreground region.
#[derive(Debug, Clone)]
pub struct Region {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    /// Polygon area enclosed by the traced boundary.
    pub area: f64,
}

impl Region {
    fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            min_x: min_x.max(0) as u32,
            min_y: min_y.max(0) as u32,
            max_x: max_x.max(0) as u32,
            max_y: max_y.max(0) as u32,
            area: polygon_area(points),
        })
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area as f64 / 2.0).abs()
}

/// Outermost regions only; holes and regions nested inside holes are skipped.
pub fn external_regions(mask: &GrayImage) -> Vec<Region> {
    // A component touching the frame has no outer border unless the mask is
    // surrounded by background, so trace a 1px padded copy.
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let points: Vec<Point<i32>> = c.points.iter().map(|p| Point::new(p.x - 1, p.y - 1)).collect();
            Region::from_points(&points)
        })
        .collect()
}

/// Parameters of the box-from-mask policy for one cue.
#[derive(Debug, Clone, Copy)]
pub struct BoxPolicy {
    pub base_confidence: f32,
    pub min_area_ratio: f64,
    pub max_boxes: usize,
}

impl BoxPolicy {
    pub fn new(base_confidence: f32, min_area_ratio: f64) -> Self {
        Self {
            base_confidence,
            min_area_ratio,
            max_boxes: 4,
        }
    }

    pub fn confidence_for(&self, area_ratio: f64) -> f32 {
        (self.base_confidence + AREA_CONFIDENCE_GAIN * area_ratio as f32).min(MAX_HEURISTIC_CONFIDENCE)
    }
}

/// Turn a cue mask into at most `policy.max_boxes` labelled boxes,
/// highest confidence first.
pub fn boxes_from_mask(
    mask: &GrayImage,
    label: LeakCategory,
    image_area: u64,
    policy: &BoxPolicy,
) -> Vec<BoundingBox> {
    let image_area = image_area.max(1) as f64;
    let min_area = image_area * policy.min_area_ratio;

    let mut boxes: Vec<BoundingBox> = external_regions(mask)
        .into_iter()
        .filter(|r| r.area >= min_area)
        .map(|r| {
            let area_ratio = r.area / image_area;
            BoundingBox {
                x1: r.min_x as f32,
                y1: r.min_y as f32,
                x2: (r.min_x + r.width()) as f32,
                y2: (r.min_y + r.height()) as f32,
                confidence: policy.confidence_for(area_ratio),
                label,
            }
        })
        .collect();

    sort_by_confidence(&mut boxes);
    boxes.truncate(policy.max_boxes);
    boxes
}
