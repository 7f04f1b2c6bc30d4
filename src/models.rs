use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// The fixed set of leak categories every detector output is mapped onto.
///
/// `NoLeak` only ever describes a whole image; it never labels a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeakCategory {
    #[serde(rename = "Pipe crack")]
    PipeCrack,
    #[serde(rename = "Rust corrosion")]
    RustCorrosion,
    #[serde(rename = "Joint leakage")]
    JointLeakage,
    #[serde(rename = "Burst pipe")]
    BurstPipe,
    #[serde(rename = "No leak detected")]
    NoLeak,
}

impl LeakCategory {
    pub const ALL: [LeakCategory; 5] = [
        LeakCategory::PipeCrack,
        LeakCategory::RustCorrosion,
        LeakCategory::JointLeakage,
        LeakCategory::BurstPipe,
        LeakCategory::NoLeak,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeakCategory::PipeCrack => "Pipe crack",
            LeakCategory::RustCorrosion => "Rust corrosion",
            LeakCategory::JointLeakage => "Joint leakage",
            LeakCategory::BurstPipe => "Burst pipe",
            LeakCategory::NoLeak => "No leak detected",
        }
    }

    /// Remediation text shown with a diagnosis. Exhaustive over every category.
    pub fn recommended_solution(&self) -> &'static str {
        match self {
            LeakCategory::PipeCrack => {
                "Apply emergency clamp, isolate section, and schedule pipe replacement."
            }
            LeakCategory::RustCorrosion => {
                "Remove corroded section and apply anti-corrosion coating with protective wrap."
            }
            LeakCategory::JointLeakage => {
                "Re-seal or replace faulty joint and re-test line pressure."
            }
            LeakCategory::BurstPipe => {
                "Shut off supply immediately, replace burst section, and inspect nearby segments."
            }
            LeakCategory::NoLeak => {
                "No immediate action required. Continue routine visual inspections."
            }
        }
    }
}

impl fmt::Display for LeakCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity tiers, `Low < Moderate < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A box straight out of a model backend, before label normalization.
/// Coordinates are pixels in the original image.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &RawBox) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// A labelled detection in pixel coordinates of the input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub label: LeakCategory,
}

impl BoundingBox {
    /// Copy with coordinates rounded to 2 decimals and confidence to 4.
    pub fn rounded(&self) -> Self {
        Self {
            x1: round_to(self.x1, 2),
            y1: round_to(self.y1, 2),
            x2: round_to(self.x2, 2),
            y2: round_to(self.y2, 2),
            confidence: round_to(self.confidence, 4),
            label: self.label,
        }
    }
}

pub(crate) fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f64.powi(decimals);
    ((value as f64 * factor).round() / factor) as f32
}

/// Sorts boxes by confidence, highest first. Stable for equal confidences.
pub fn sort_by_confidence(boxes: &mut [BoundingBox]) {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Which detector produced the final detection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Model,
    Heuristic,
}

/// Final diagnosis for one image.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub leak_type: LeakCategory,
    pub severity_level: Severity,
    pub confidence_score: f32,
    pub recommended_solution: &'static str,
    /// Confidence-descending.
    pub detections: Vec<BoundingBox>,
    /// JPEG bytes of the input with the detections drawn on it.
    pub annotated_image: Vec<u8>,
    pub source: DetectionSource,
}

impl DetectionResult {
    pub fn best_match(&self) -> Option<&BoundingBox> {
        self.detections.first()
    }

    pub fn detections_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.detections)
    }

    pub fn to_response(&self) -> DetectionResponse {
        DetectionResponse {
            leak_type: self.leak_type,
            severity_level: self.severity_level,
            confidence_score: self.confidence_score,
            recommended_solution: self.recommended_solution.to_string(),
            annotated_image_base64: STANDARD.encode(&self.annotated_image),
            detections: self.detections.clone(),
        }
    }
}

/// Transport form of a [`DetectionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub leak_type: LeakCategory,
    pub severity_level: Severity,
    pub confidence_score: f32,
    pub recommended_solution: String,
    pub annotated_image_base64: String,
    pub detections: Vec<BoundingBox>,
}

/// History row handed to whatever stores past detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub filename: String,
    pub leak_type: LeakCategory,
    pub severity_level: Severity,
    pub confidence_score: f32,
    pub recommended_solution: String,
    pub detections_json: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl DetectionRecord {
    pub fn from_result(filename: &str, result: &DetectionResult) -> serde_json::Result<Self> {
        let filename = match filename.trim() {
            "" => "uploaded_image".to_string(),
            name => name.to_string(),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            filename,
            leak_type: result.leak_type,
            severity_level: result.severity_level,
            confidence_score: result.confidence_score,
            recommended_solution: result.recommended_solution.to_string(),
            detections_json: result.detections_json()?,
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Stored detections; rows written by older versions may not parse and
    /// yield an empty list.
    pub fn detections(&self) -> Vec<BoundingBox> {
        serde_json::from_str(&self.detections_json).unwrap_or_default()
    }
}
