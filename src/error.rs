use std::path::PathBuf;
use thiserror::Error;

/// The input could not be turned into pixels; nothing can be detected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Uploaded image is empty")]
    Empty,

    #[error("Invalid image file, unable to decode: {0}")]
    Unreadable(#[source] image::ImageError),
}

/// Failures a detection call can surface to its caller.
#[derive(Debug, Error)]
pub enum LeakError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(
        "Detection model not found at '{}' and fallback '{}' is also missing",
        primary.display(),
        fallback.display()
    )]
    ModelUnavailable { primary: PathBuf, fallback: PathBuf },

    /// Model resolved but failed to load or predict. Recovered inside the
    /// detector; only returned by the model stage itself.
    #[error("Model inference failed: {0}")]
    InferenceFailed(String),

    #[error("Failed to encode annotated image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Detection worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl LeakError {
    /// Errors caused by the uploaded bytes rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LeakError::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, LeakError>;
