use crate::models::{LeakCategory, Severity};

/// Severity tier for a category at a given (unrounded) confidence.
pub fn severity(category: LeakCategory, confidence: f32) -> Severity {
    match category {
        LeakCategory::BurstPipe if confidence >= 0.45 => Severity::Critical,
        LeakCategory::BurstPipe => Severity::Moderate,
        LeakCategory::PipeCrack if confidence >= 0.6 => Severity::High,
        LeakCategory::PipeCrack => Severity::Moderate,
        LeakCategory::RustCorrosion | LeakCategory::JointLeakage if confidence >= 0.5 => {
            Severity::Moderate
        }
        LeakCategory::RustCorrosion | LeakCategory::JointLeakage => Severity::Low,
        LeakCategory::NoLeak => Severity::Low,
    }
}
