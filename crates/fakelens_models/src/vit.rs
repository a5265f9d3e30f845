//! Vision transformer deepfake classifier.
//!
//! A SigLIP-style two-stage model: a vision encoder (patch embedding,
//! learned position embedding, pre-norm transformer blocks, final layer
//! norm) followed by a classifier head (mean pooling over patches and a
//! linear projection to the fake/real logits).

use burn::nn::{
    attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
    conv::{Conv2d, Conv2dConfig},
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear,
    LinearConfig,
};
use burn::prelude::*;
use burn::tensor::activation::gelu;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::{LayerInfo, LayerKind, LayerObserver, VisionClassifier};
use serde::{Deserialize, Serialize};

/// Path of the vision subnetwork root.
pub const VISION_PATH: &str = "vision";
/// Path of the patch embedding layer.
pub const PATCH_EMBEDDING_PATH: &str = "vision.embeddings.patch_embedding";
/// Path of the encoder block stack.
pub const ENCODER_PATH: &str = "vision.encoder";

/// How image patches are projected to tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchProjection {
    /// Strided 2D convolution (SigLIP default).
    Conv,
    /// Unfold patches and apply a dense projection.
    Linear,
}

/// Configuration for the vision transformer classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViTClassifierConfig {
    /// Square input resolution.
    pub image_size: usize,
    /// Side length of a square patch.
    pub patch_size: usize,
    /// Number of input color channels.
    pub n_channels: usize,
    /// Hidden dimension.
    pub d_model: usize,
    /// Number of attention heads.
    pub n_heads: usize,
    /// Number of encoder blocks.
    pub n_layers: usize,
    /// Feedforward dimension.
    pub d_ff: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Layer norm epsilon.
    pub layer_norm_eps: f64,
    /// Dropout rate.
    pub dropout: f64,
    /// Patch projection variant.
    pub patch_projection: PatchProjection,
}

impl Default for ViTClassifierConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            patch_size: 16,
            n_channels: 3,
            d_model: 768,
            n_heads: 12,
            n_layers: 12,
            d_ff: 3072,
            n_classes: 2,
            layer_norm_eps: 1e-6,
            dropout: 0.0,
            patch_projection: PatchProjection::Conv,
        }
    }
}

impl ViTClassifierConfig {
    /// Create a new config with specified input geometry.
    pub fn new(image_size: usize, patch_size: usize) -> Self {
        Self {
            image_size,
            patch_size,
            ..Default::default()
        }
    }

    /// Set the encoder width and depth.
    #[must_use]
    pub fn with_encoder(mut self, d_model: usize, n_heads: usize, n_layers: usize, d_ff: usize) -> Self {
        self.d_model = d_model;
        self.n_heads = n_heads;
        self.n_layers = n_layers;
        self.d_ff = d_ff;
        self
    }

    /// Set the patch projection variant.
    #[must_use]
    pub fn with_patch_projection(mut self, projection: PatchProjection) -> Self {
        self.patch_projection = projection;
        self
    }

    /// Number of patches along each side.
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }

    /// Total number of patches.
    pub fn n_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ViTClassifier<B> {
        ViTClassifier::new(self.clone(), device)
    }
}

/// Pre-norm transformer encoder block.
#[derive(Module, Debug)]
struct EncoderBlock<B: Backend> {
    norm1: LayerNorm<B>,
    attention: MultiHeadAttention<B>,
    norm2: LayerNorm<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    fn new(config: &ViTClassifierConfig, device: &B::Device) -> Self {
        let norm1 = LayerNormConfig::new(config.d_model)
            .with_epsilon(config.layer_norm_eps)
            .init(device);
        let attention = MultiHeadAttentionConfig::new(config.d_model, config.n_heads)
            .with_dropout(config.dropout)
            .init(device);
        let norm2 = LayerNormConfig::new(config.d_model)
            .with_epsilon(config.layer_norm_eps)
            .init(device);
        let fc1 = LinearConfig::new(config.d_model, config.d_ff).init(device);
        let fc2 = LinearConfig::new(config.d_ff, config.d_model).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();

        Self {
            norm1,
            attention,
            norm2,
            fc1,
            fc2,
            dropout,
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        // Self-attention with residual
        let attn_input = MhaInput::self_attn(self.norm1.forward(x.clone()));
        let attn_out = self.attention.forward(attn_input).context;
        let x = x + self.dropout.forward(attn_out);

        // MLP with residual
        let ff_out = self.fc1.forward(self.norm2.forward(x.clone()));
        let ff_out = self.dropout.forward(gelu(ff_out));
        x + self.dropout.forward(self.fc2.forward(ff_out))
    }
}

/// Vision transformer for binary deepfake classification.
///
/// Architecture:
/// - Patch embedding (strided Conv2d or unfold + Linear) -> tokens
/// - Learned position embedding
/// - N pre-norm encoder blocks
/// - Post layer norm
/// - Mean pooling over patches
/// - Linear(d_model, n_classes)
///
/// # Example
///
/// ```rust,ignore
/// use fakelens_models::ViTClassifierConfig;
///
/// let config = ViTClassifierConfig::new(224, 16);
/// let model = config.init::<Autodiff<NdArray>>(&device);
///
/// let logits = model.forward(pixels);
/// // logits shape: [1, 2]
/// ```
#[derive(Module, Debug)]
pub struct ViTClassifier<B: Backend> {
    /// Convolutional patch projection.
    patch_conv: Option<Conv2d<B>>,
    /// Dense patch projection.
    patch_linear: Option<Linear<B>>,
    /// Learned position embedding.
    position_embedding: Embedding<B>,
    /// Encoder blocks.
    blocks: Vec<EncoderBlock<B>>,
    /// Final encoder norm.
    post_norm: LayerNorm<B>,
    /// Classifier head.
    head: Linear<B>,
    patch_size: usize,
    grid_size: usize,
    image_size: usize,
    n_classes: usize,
}

impl<B: Backend> ViTClassifier<B> {
    /// Create a new model.
    pub fn new(config: ViTClassifierConfig, device: &B::Device) -> Self {
        let patch = config.patch_size;
        let (patch_conv, patch_linear) = match config.patch_projection {
            PatchProjection::Conv => {
                let conv = Conv2dConfig::new([config.n_channels, config.d_model], [patch, patch])
                    .with_stride([patch, patch])
                    .init(device);
                (Some(conv), None)
            }
            PatchProjection::Linear => {
                let linear =
                    LinearConfig::new(config.n_channels * patch * patch, config.d_model).init(device);
                (None, Some(linear))
            }
        };

        let position_embedding = EmbeddingConfig::new(config.n_patches(), config.d_model).init(device);

        let blocks = (0..config.n_layers)
            .map(|_| EncoderBlock::new(&config, device))
            .collect();

        let post_norm = LayerNormConfig::new(config.d_model)
            .with_epsilon(config.layer_norm_eps)
            .init(device);
        let head = LinearConfig::new(config.d_model, config.n_classes).init(device);

        Self {
            patch_conv,
            patch_linear,
            position_embedding,
            blocks,
            post_norm,
            head,
            patch_size: patch,
            grid_size: config.grid_size(),
            image_size: config.image_size,
            n_classes: config.n_classes,
        }
    }

    /// Number of encoder blocks.
    pub fn n_layers(&self) -> usize {
        self.blocks.len()
    }

    /// Patch embedding plus position embedding, as a token sequence.
    fn embed<O: FnMut(Tensor<B, 4>) -> Tensor<B, 4>>(
        &self,
        pixels: Tensor<B, 4>,
        mut on_patch_map: O,
    ) -> Tensor<B, 3> {
        let [batch, channels, _, _] = pixels.dims();
        let (g, p) = (self.grid_size, self.patch_size);

        let tokens = match (&self.patch_conv, &self.patch_linear) {
            (Some(conv), _) => {
                // (batch, d_model, g, g) -> (batch, g*g, d_model)
                let map = on_patch_map(conv.forward(pixels));
                map.flatten::<3>(2, 3).swap_dims(1, 2)
            }
            (None, Some(linear)) => {
                // (batch, c, g, p, g, p) -> (batch, g, g, c, p, p) -> (batch, g*g, c*p*p)
                let patches = pixels
                    .reshape([batch, channels, g, p, g, p])
                    .permute([0, 2, 4, 1, 3, 5])
                    .reshape([batch, g * g, channels * p * p]);
                linear.forward(patches)
            }
            (None, None) => unreachable!("model is built with exactly one patch projection"),
        };

        let device = tokens.device();
        let positions = Tensor::<B, 1, Int>::arange(0..(g * g) as i64, &device).reshape([1, g * g]);
        tokens + self.position_embedding.forward(positions)
    }

    /// Mean-pool tokens and project to class logits.
    fn classify(&self, tokens: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, d_model] = tokens.dims();
        let pooled = tokens.mean_dim(1).reshape([batch, d_model]);
        self.head.forward(pooled)
    }

    /// Encoder output without observers.
    fn encode(&self, pixels: Tensor<B, 4>) -> Tensor<B, 3> {
        let mut x = self.embed(pixels, |map| map);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.post_norm.forward(x)
    }

    /// Inference forward pass returning logits.
    pub fn forward(&self, pixels: Tensor<B, 4>) -> Tensor<B, 2> {
        self.classify(self.encode(pixels))
    }
}

impl<B: AutodiffBackend> VisionClassifier<B> for ViTClassifier<B> {
    fn num_classes(&self) -> usize {
        self.n_classes
    }

    fn image_size(&self) -> usize {
        self.image_size
    }

    /// Only the boundaries `forward_observed` reports. The linear patch
    /// projection emits tokens before any grid-shaped map exists, so it is
    /// not listed.
    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers = vec![LayerInfo::new(VISION_PATH, LayerKind::Vision)];
        if self.patch_conv.is_some() {
            layers.push(LayerInfo::new(PATCH_EMBEDDING_PATH, LayerKind::Conv2d));
        }
        layers.push(LayerInfo::new(ENCODER_PATH, LayerKind::Encoder));
        for i in 0..self.blocks.len() {
            layers.push(LayerInfo::new(
                format!("{ENCODER_PATH}.blocks.{i}"),
                LayerKind::EncoderBlock,
            ));
        }
        layers
    }

    fn forward_observed(
        &self,
        pixels: Tensor<B, 4>,
        observer: &mut dyn LayerObserver<B>,
    ) -> Tensor<B, 2> {
        let grid = [self.grid_size, self.grid_size];

        let mut x = self.embed(pixels, |map| observer.on_feature_map(PATCH_EMBEDDING_PATH, map));
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            x = observer.on_tokens(&format!("{ENCODER_PATH}.blocks.{i}"), x, grid);
        }
        x = observer.on_tokens(ENCODER_PATH, x, grid);

        let x = self.post_norm.forward(x);
        let x = observer.on_tokens(VISION_PATH, x, grid);

        self.classify(x)
    }

    fn encoder_features(&self, pixels: Tensor<B, 4>) -> Option<Tensor<B, 3>> {
        Some(self.encode(pixels).detach())
    }
}
