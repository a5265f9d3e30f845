//! Error types for detection requests.

use thiserror::Error;

/// Result type alias using [`DetectError`].
pub type Result<T> = std::result::Result<T, DetectError>;

/// Request-level detection errors.
///
/// Visualization failures never appear here; they only clear the
/// `available` flag of the report.
#[derive(Error, Debug)]
pub enum DetectError {
    /// The request body is not a usable image.
    #[error("Decode error: {0}")]
    Decode(#[from] fakelens_core::CoreError),

    /// The request carried no image data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The classifier produced unusable output.
    #[error("Inference error: {0}")]
    Inference(String),

    /// The model could not be loaded.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] fakelens_models::CheckpointError),

    /// Configuration file error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
