//! # fakelens_core
//!
//! Core types and traits for fakelens deepfake detection.
//!
//! This crate provides:
//! - [`VisionClassifier`], the interface every detector model implements
//! - [`LayerObserver`] and [`LayerInfo`] for tapping a model's internal layers
//! - [`Label`] and [`Verdict`] for the binary fake/real outcome
//! - [`ImageProcessor`] for turning decoded images into model input tensors
//! - Error types and common utilities
//!
//! ## Tensor Convention
//!
//! Images enter models as `(B, C, H, W)` tensors:
//! - `B`: Batch size (always 1 for request handling)
//! - `C`: Color channels (RGB)
//! - `H`, `W`: The model's square input resolution
//!
//! ## Example
//!
//! ```rust,ignore
//! use fakelens_core::{ImageProcessor, ProcessorConfig};
//!
//! let processor = ImageProcessor::new(ProcessorConfig::default());
//! let image = processor.decode(&bytes)?;
//! let pixels = processor.preprocess::<Backend>(&image, &device);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod model_trait;
mod processor;
mod verdict;

pub use error::{CoreError, Result};
pub use model_trait::{LayerInfo, LayerKind, LayerObserver, NoopObserver, VisionClassifier};
pub use processor::{ImageProcessor, ProcessorConfig};
pub use verdict::{Label, Verdict};

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// Gradient-tracking CPU backend used by the detector by default.
    #[cfg(feature = "backend-ndarray")]
    pub type DefaultBackend = Autodiff<NdArray>;
}
