//! # fakelens_models
//!
//! Reference deepfake classifiers for fakelens.
//!
//! - [`ViTClassifier`] - SigLIP-style vision transformer with a linear
//!   classifier head, implementing [`fakelens_core::VisionClassifier`]
//! - [`checkpoint`] - save and load weights with their metadata

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod vit;

pub use checkpoint::{
    load_checkpoint, save_checkpoint, CheckpointError, CheckpointMetadata,
};
pub use vit::{
    PatchProjection, ViTClassifier, ViTClassifierConfig, ENCODER_PATH, PATCH_EMBEDDING_PATH,
    VISION_PATH,
};
