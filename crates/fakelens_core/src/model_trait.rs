//! Model traits for detection and explanation.
//!
//! Defines the interface a vision classifier must implement so the
//! explanation engine can run it, enumerate its layers and observe
//! intermediate outputs without knowing the concrete architecture.

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

/// Structural role of a layer inside a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// Root of the vision subnetwork.
    Vision,
    /// 2D convolution.
    Conv2d,
    /// Patch or position embedding.
    Embedding,
    /// A stack of encoder blocks.
    Encoder,
    /// A single encoder block.
    EncoderBlock,
    /// Attention sublayer.
    Attention,
    /// Feedforward sublayer.
    Mlp,
    /// Normalization layer.
    Norm,
    /// Pooling over positions.
    Pooling,
    /// Dense projection, e.g. the classifier head.
    Linear,
}

/// One entry of a classifier's layer inventory.
///
/// Paths are dot separated (`vision.encoder.blocks.3`) and listed in
/// traversal order, parents before children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Dot separated path of the layer.
    pub path: String,
    /// Structural role of the layer.
    pub kind: LayerKind,
}

impl LayerInfo {
    /// Create a new layer entry.
    pub fn new(path: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.path.split('.').count()
    }

    /// Whether this layer is `ancestor` itself or nested below it.
    pub fn is_within(&self, ancestor: &str) -> bool {
        self.path == ancestor
            || (self.path.starts_with(ancestor)
                && self.path[ancestor.len()..].starts_with('.'))
    }
}

/// Observer invoked by a classifier at each reported layer boundary.
///
/// Implementations return the tensor the model should continue with. It must
/// hold the same values as `output`; observers may only change how the tensor
/// participates in gradient tracking.
pub trait LayerObserver<B: AutodiffBackend> {
    /// Called with a spatial feature map of shape (batch, channels, height, width).
    fn on_feature_map(&mut self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        let _ = layer;
        output
    }

    /// Called with a token sequence of shape (batch, seq_len, hidden).
    ///
    /// `grid` is the `[height, width]` patch grid the sequence was flattened from.
    fn on_tokens(&mut self, layer: &str, output: Tensor<B, 3>, grid: [usize; 2]) -> Tensor<B, 3> {
        let _ = (layer, grid);
        output
    }
}

/// Observer that passes every tensor through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<B: AutodiffBackend> LayerObserver<B> for NoopObserver {}

/// Trait for binary image classifiers with a vision encoder and a classifier head.
///
/// Class 0 is "fake", class 1 is "real".
pub trait VisionClassifier<B: AutodiffBackend>: Send {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Square input resolution expected by [`forward`](Self::forward).
    fn image_size(&self) -> usize;

    /// Layer inventory in traversal order.
    ///
    /// Lists exactly the layers [`forward_observed`](Self::forward_observed)
    /// reports to its observer; anything else cannot be tapped.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Forward pass with gradient tracking, notifying `observer` at the
    /// layer boundaries it exposes.
    ///
    /// # Arguments
    ///
    /// * `pixels` - Input tensor of shape (batch, 3, size, size)
    ///
    /// # Returns
    ///
    /// Logits tensor of shape (batch, n_classes)
    fn forward_observed(
        &self,
        pixels: Tensor<B, 4>,
        observer: &mut dyn LayerObserver<B>,
    ) -> Tensor<B, 2>;

    /// Plain inference returning detached logits.
    fn forward(&self, pixels: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_observed(pixels, &mut NoopObserver).detach()
    }

    /// Forward pass returning class probabilities.
    fn forward_probs(&self, pixels: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(pixels), 1)
    }

    /// Output sequence of the vision encoder, shape (batch, seq_len, hidden).
    ///
    /// Returns `None` when the model has no token-shaped encoder output.
    fn encoder_features(&self, pixels: Tensor<B, 4>) -> Option<Tensor<B, 3>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_depth() {
        let layer = LayerInfo::new("vision.encoder.blocks.3", LayerKind::EncoderBlock);
        assert_eq!(layer.depth(), 4);
        assert_eq!(LayerInfo::new("vision", LayerKind::Vision).depth(), 1);
    }

    #[test]
    fn test_layer_is_within() {
        let layer = LayerInfo::new("vision.encoder.blocks.3", LayerKind::EncoderBlock);
        assert!(layer.is_within("vision"));
        assert!(layer.is_within("vision.encoder"));
        assert!(layer.is_within("vision.encoder.blocks.3"));
        assert!(!layer.is_within("vision.enc"));
        assert!(!layer.is_within("head"));
    }

    #[test]
    fn test_layer_kind_serde() {
        let json = serde_json::to_string(&LayerKind::EncoderBlock).unwrap();
        let decoded: LayerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, LayerKind::EncoderBlock);
    }
}
