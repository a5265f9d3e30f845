//! # fakelens_explain
//!
//! Visual explanations for fakelens classifiers.
//!
//! This crate provides:
//! - Tap point selection over a classifier's layer inventory
//! - Activation/gradient capture through a scoped [`TapSession`]
//! - Grad-CAM saliency with a forward-only feature magnitude fallback
//! - Verdict-specific colorization and selective overlay compositing
//! - PNG / data URI encoding of the resulting artifacts
//!
//! ## Pipeline
//!
//! ```text
//! preprocess -> strategies (GradCam, FeatureMagnitude) -> threshold
//!            -> resample -> colorize -> blend -> encode
//! ```
//!
//! [`Explainer::explain`] never returns an error; when nothing works the
//! artifact is the original image as both outputs.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod colorize;
mod composite;
mod config;
mod encode;
mod error;
mod explainer;
mod fallback;
mod locator;
mod map;
mod saliency;
mod strategy;
mod tap;

pub use colorize::{band_thresholds, colorize, threshold, BLACK, RED, YELLOW};
pub use composite::{blend, overlay, render, Rendered};
pub use config::{BandPolicy, ExplainConfig, SaliencyMethod};
pub use encode::{encode_png, to_data_uri, VisualizationArtifact};
pub use error::{ExplainError, Result};
pub use explainer::Explainer;
pub use fallback::{feature_magnitudes, magnitude_grid, square_side, FeatureMagnitude};
pub use locator::{locate_tap_point, TapPoint, TapSelection};
pub use map::{percentile, ImportanceMap};
pub use saliency::{grad_cam, GradCam};
pub use strategy::{first_produced, Attempt, Saliency, SaliencyRequest, SaliencyStrategy};
pub use tap::{CapturedPair, FeatureTap, TapSession};
