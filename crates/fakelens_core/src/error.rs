//! Error types for fakelens_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while preparing model inputs.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The bytes could not be decoded as an image.
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The image decoded but cannot be fed to a model.
    #[error("Invalid image: {0}")]
    InvalidImage(String),
}
