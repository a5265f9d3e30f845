//! Detector configuration.

use std::path::{Path, PathBuf};

use fakelens_explain::ExplainConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// Configuration for a [`Detector`](crate::Detector).
///
/// # Example
///
/// ```rust,ignore
/// let config = DetectorConfig::from_file("detector.json")?;
/// let detector = Detector::from_checkpoint(config, device)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Checkpoint directory holding weights and metadata.
    pub checkpoint_dir: Option<PathBuf>,
    /// Model name reported when the checkpoint does not carry one.
    pub model_name: String,
    /// Device name reported in model info.
    pub device_name: String,
    /// Whether `detect` renders a visualization unless told otherwise.
    pub visualize: bool,
    /// Explanation pipeline settings.
    pub explain: ExplainConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: None,
            model_name: "fakelens-vit".to_string(),
            device_name: "cpu".to_string(),
            visualize: true,
            explain: ExplainConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Set the checkpoint directory.
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Set the reported model name.
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Set the explanation settings.
    #[must_use]
    pub fn with_explain(mut self, explain: ExplainConfig) -> Self {
        self.explain = explain;
        self
    }

    /// Enable or disable visualization by default.
    #[must_use]
    pub fn with_visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| DetectError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DetectError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DetectorConfig::default();
        assert!(config.checkpoint_dir.is_none());
        assert!(config.visualize);
        assert_eq!(config.explain, ExplainConfig::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");

        let config = DetectorConfig::default()
            .with_checkpoint_dir("runs/vit")
            .with_model_name("custom")
            .with_visualize(false)
            .with_explain(ExplainConfig::default().with_threshold_percentile(80.0));
        config.save(&path).unwrap();

        let loaded = DetectorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "model_name": "partial" }"#).unwrap();

        let loaded = DetectorConfig::from_file(&path).unwrap();
        assert_eq!(loaded.model_name, "partial");
        assert_eq!(loaded.explain.threshold_percentile, 70.0);
    }

    #[test]
    fn test_config_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DetectorConfig::from_file(&path),
            Err(DetectError::Config(_))
        ));
    }
}
