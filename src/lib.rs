pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use config::DetectorConfig;
pub use detection::LeakDetector;
pub use detection::heuristic::HeuristicDetector;
pub use detection::model::{InferenceBackend, InferenceParams, ModelLoader};
pub use error::{DecodeError, LeakError, Result};
pub use models::{
    BoundingBox, DetectionRecord, DetectionResponse, DetectionResult, DetectionSource,
    LeakCategory, RawBox, Severity,
};
pub use pipeline::{DebugConfig, MaskContext, MaskPipeline, MaskStep};
