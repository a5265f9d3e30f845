//! # fakelens
//!
//! Deepfake detection with gradient-based visual explanations.
//!
//! fakelens classifies an image as FAKE or REAL and shows which regions drove
//! the decision:
//!
//! - **Models**: a vision transformer classifier with checkpoint loading
//! - **Explanations**: Grad-CAM at an automatically located tap point, with a
//!   forward-only fallback when gradients cannot be captured
//! - **Rendering**: red/yellow bands for fake verdicts, a green ramp for real
//!   ones, blended only where the map is non-zero
//! - **Detection**: a facade producing serializable reports with timings and
//!   PNG data URIs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fakelens::prelude::*;
//!
//! let config = DetectorConfig::default().with_checkpoint_dir("runs/vit");
//! let detector = Detector::<DefaultBackend, ViTClassifier<_>>::from_checkpoint(
//!     config,
//!     Default::default(),
//! )?;
//!
//! let report = detector.detect(&std::fs::read("photo.jpg")?, None)?;
//! println!("{} ({:.2}%)", report.prediction, report.confidence);
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use fakelens_core as core;
pub use fakelens_detect as detect;
pub use fakelens_explain as explain;
pub use fakelens_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use fakelens::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use fakelens_core::{
        ImageProcessor, Label, LayerInfo, LayerKind, LayerObserver, ProcessorConfig, Result,
        Verdict, VisionClassifier,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use fakelens_core::backend::DefaultBackend;

    // Models
    pub use fakelens_models::{
        load_checkpoint, save_checkpoint, CheckpointMetadata, ViTClassifier, ViTClassifierConfig,
    };

    // Explain
    pub use fakelens_explain::{
        BandPolicy, ExplainConfig, Explainer, ImportanceMap, SaliencyMethod, VisualizationArtifact,
    };

    // Detection
    pub use fakelens_detect::{DetectionReport, Detector, DetectorConfig, Prediction};
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use fakelens_core::backend;
    pub use fakelens_detect::{
        interpretation, DetectError, HealthReport, ModelInfo, Probabilities, VisualizationReport,
    };
    pub use fakelens_explain::{
        colorize, grad_cam, locate_tap_point, overlay, render, threshold, CapturedPair,
        ExplainError, FeatureMagnitude, FeatureTap, GradCam, Saliency, SaliencyStrategy,
        TapPoint, TapSession,
    };
}
