//! # fakelens_detect
//!
//! Detection facade: decode, classify, explain and report.
//!
//! A [`Detector`] owns one classifier for its whole lifetime. Request
//! failures (undecodable bytes, broken model output) are [`DetectError`]s;
//! visualization failures only mark the report's visualization as
//! unavailable.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fakelens_detect::{Detector, DetectorConfig};
//!
//! let config = DetectorConfig::default().with_checkpoint_dir("runs/vit");
//! let detector = Detector::<Backend, _>::from_checkpoint(config, device)?;
//! let report = detector.detect(&bytes, None)?;
//! println!("{}", report.to_json()?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod detector;
mod error;
mod report;

pub use config::DetectorConfig;
pub use detector::Detector;
pub use error::{DetectError, Result};
pub use report::{
    interpretation, AnalysisReport, DetectionReport, HealthReport, ModelInfo, Prediction,
    Probabilities, VisualizationReport, HIGH_CONFIDENCE, MODERATE_CONFIDENCE,
};
