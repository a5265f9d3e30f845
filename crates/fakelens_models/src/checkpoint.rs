//! Model checkpointing and serialization utilities.
//!
//! A checkpoint is a directory holding the weights, saved with Burn's named
//! MessagePack recorder, next to a JSON metadata file carrying the model
//! configuration and label names:
//!
//! ```text
//! checkpoint/
//!   model.mpk
//!   metadata.json
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use fakelens_models::checkpoint::{load_checkpoint, save_checkpoint, CheckpointMetadata};
//!
//! let config = ViTClassifierConfig::default();
//! let model = config.init::<Backend>(&device);
//! save_checkpoint(&model, &CheckpointMetadata::new(&config), "runs/detector")?;
//!
//! let (model, metadata) = load_checkpoint::<Backend>("runs/detector", &device)?;
//! ```

use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use fakelens_core::Label;
use serde::{Deserialize, Serialize};

use crate::vit::{ViTClassifier, ViTClassifierConfig};

/// Weights file stem inside a checkpoint directory (the recorder adds `.mpk`).
pub const WEIGHTS_STEM: &str = "model";
/// Metadata file name inside a checkpoint directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Human readable model name reported by the detector. Empty when unset.
    #[serde(default)]
    pub model_name: String,
    /// Model configuration.
    pub config: ViTClassifierConfig,
    /// Label names in class-index order.
    pub labels: Vec<String>,
    /// Seed used to initialize the weights, if they were not trained.
    pub init_seed: Option<u64>,
    /// Additional metadata.
    pub extra: std::collections::HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a model configuration.
    pub fn new(config: &ViTClassifierConfig) -> Self {
        Self {
            arch: "ViTClassifier".to_string(),
            model_name: "fakelens-vit".to_string(),
            config: config.clone(),
            labels: Label::ALL.iter().map(|l| l.as_str().to_string()).collect(),
            init_seed: None,
            extra: std::collections::HashMap::new(),
        }
    }

    /// Set the reported model name.
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Record the initialization seed.
    #[must_use]
    pub fn with_init_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Load(e.to_string()))
    }
}

/// Save model weights and metadata into a checkpoint directory.
pub fn save_checkpoint<B: Backend>(
    model: &ViTClassifier<B>,
    metadata: &CheckpointMetadata,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| CheckpointError::Save(e.to_string()))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &recorder)
        .map_err(|e| CheckpointError::Save(e.to_string()))?;
    metadata.save(dir.join(METADATA_FILE))?;

    tracing::info!("Saved checkpoint to {:?}", dir);
    Ok(())
}

/// Load a model and its metadata from a checkpoint directory.
pub fn load_checkpoint<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(ViTClassifier<B>, CheckpointMetadata)> {
    let dir = dir.as_ref();
    let metadata = CheckpointMetadata::load(dir.join(METADATA_FILE))?;
    if metadata.arch != "ViTClassifier" {
        return Err(CheckpointError::InvalidFormat(format!(
            "unsupported architecture '{}'",
            metadata.arch
        )));
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = metadata
        .config
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_STEM), &recorder, device)
        .map_err(|e| CheckpointError::Load(e.to_string()))?;

    tracing::info!(
        "Loaded checkpoint {:?} ({}, {} encoder blocks)",
        dir,
        metadata.model_name,
        model.n_layers()
    );
    Ok((model, metadata))
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Invalid format.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config() -> ViTClassifierConfig {
        ViTClassifierConfig::new(16, 8).with_encoder(8, 2, 1, 16)
    }

    #[test]
    fn test_checkpoint_metadata() {
        let meta = CheckpointMetadata::new(&tiny_config())
            .with_model_name("tiny")
            .with_init_seed(7)
            .with_extra("dataset", "synthetic");

        assert_eq!(meta.arch, "ViTClassifier");
        assert_eq!(meta.model_name, "tiny");
        assert_eq!(meta.labels, vec!["fake".to_string(), "real".to_string()]);
        assert_eq!(meta.init_seed, Some(7));
        assert_eq!(meta.extra.get("dataset"), Some(&"synthetic".to_string()));
    }

    #[test]
    fn test_checkpoint_roundtrip_preserves_logits() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        save_checkpoint(&model, &CheckpointMetadata::new(&config), dir.path()).unwrap();
        let (loaded, meta) = load_checkpoint::<TestBackend>(dir.path(), &device).unwrap();
        assert_eq!(meta.config, config);

        let pixels = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let before = model.forward(pixels.clone()).into_data().to_vec::<f32>().unwrap();
        let after = loaded.forward(pixels).into_data().to_vec::<f32>().unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let result = load_checkpoint::<TestBackend>(dir.path().join("missing"), &device);
        assert!(matches!(result, Err(CheckpointError::Load(_))));
    }

    #[test]
    fn test_load_rejects_unknown_arch() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut meta = CheckpointMetadata::new(&tiny_config());
        meta.arch = "ResNet".to_string();
        meta.save(dir.path().join(METADATA_FILE)).unwrap();

        let result = load_checkpoint::<TestBackend>(dir.path(), &device);
        assert!(matches!(result, Err(CheckpointError::InvalidFormat(_))));
    }
}
