mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from leakscan for tests
pub use leakscan::{
    BoundingBox, DecodeError, DetectionRecord, DetectionSource, DetectorConfig, LeakCategory,
    LeakDetector, LeakError, RawBox, Severity,
};
