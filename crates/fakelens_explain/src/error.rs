//! Error types for fakelens_explain.
//!
//! Only [`ExplainError::ModelTopology`] escapes an [`Explainer`](crate::Explainer)
//! (from [`Explainer::new`](crate::Explainer::new)); everything else is
//! recovered inside the pipeline.

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while producing an explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The classifier exposes no vision subnetwork to tap.
    #[error("Model topology error: {0}")]
    ModelTopology(String),

    /// The tap produced no usable activation/gradient pair.
    #[error("Capture miss: {0}")]
    CaptureMiss(String),

    /// An importance map could not be aligned to the requested resolution.
    #[error("Resample error: cannot align {from:?} to {to:?}")]
    Resample {
        /// Source `[height, width]`.
        from: [usize; 2],
        /// Requested `[height, width]`.
        to: [usize; 2],
    },

    /// Image encoding failed.
    #[error("Encode error: {0}")]
    Encode(#[from] image::ImageError),

    /// Map data does not match its declared shape.
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
