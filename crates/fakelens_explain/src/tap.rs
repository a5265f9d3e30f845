//! Activation and gradient capture at a single tap point.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::LayerObserver;

use crate::error::{ExplainError, Result};
use crate::locator::TapPoint;

/// Gradient-tracked output retained between the forward and backward pass.
enum Retained<B: AutodiffBackend> {
    Map(Tensor<B, 4>),
    Tokens { leaf: Tensor<B, 3>, grid: [usize; 2] },
}

/// Activation and gradient at the tap point, each of shape
/// (channels, height, width).
#[derive(Debug, Clone)]
pub struct CapturedPair<B: Backend> {
    /// Output of the tapped layer.
    pub activation: Tensor<B, 3>,
    /// Gradient of the target score with respect to that output.
    pub gradient: Tensor<B, 3>,
}

impl<B: Backend> CapturedPair<B> {
    /// Pair an activation with its gradient.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::CaptureMiss`] if the shapes differ.
    pub fn new(activation: Tensor<B, 3>, gradient: Tensor<B, 3>) -> Result<Self> {
        let (a, g) = (activation.dims(), gradient.dims());
        if a != g {
            return Err(ExplainError::CaptureMiss(format!(
                "activation {a:?} and gradient {g:?} disagree"
            )));
        }
        Ok(Self {
            activation,
            gradient,
        })
    }

    /// `[channels, height, width]`.
    pub fn dims(&self) -> [usize; 3] {
        self.activation.dims()
    }
}

/// Capture context bound to one tap point.
///
/// Use [`arm`](Self::arm) before each forward pass; the returned
/// [`TapSession`] is the observer handed to the classifier.
pub struct FeatureTap<B: AutodiffBackend> {
    point: TapPoint,
    retained: Option<Retained<B>>,
    forward_hits: usize,
}

impl<B: AutodiffBackend> FeatureTap<B> {
    /// Create a tap for `point`.
    pub fn new(point: TapPoint) -> Self {
        Self {
            point,
            retained: None,
            forward_hits: 0,
        }
    }

    /// The tapped layer.
    pub fn point(&self) -> &TapPoint {
        &self.point
    }

    /// Whether tensors are currently retained.
    pub fn is_holding(&self) -> bool {
        self.retained.is_some()
    }

    /// Clear retained tensors and start a capture session.
    pub fn arm(&mut self) -> TapSession<'_, B> {
        self.reset();
        TapSession { tap: self }
    }

    fn reset(&mut self) {
        self.retained = None;
        self.forward_hits = 0;
    }

    fn retain(&mut self, layer: &str, retained: Retained<B>) {
        self.forward_hits += 1;
        if self.forward_hits > 1 {
            tracing::debug!(
                layer,
                hits = self.forward_hits,
                "tap point fired again, keeping last output"
            );
        }
        self.retained = Some(retained);
    }
}

/// One armed capture. Dropping it releases everything it retained.
pub struct TapSession<'a, B: AutodiffBackend> {
    tap: &'a mut FeatureTap<B>,
}

impl<B: AutodiffBackend> TapSession<'_, B> {
    /// Whether the tap point was reached during the forward pass.
    pub fn fired(&self) -> bool {
        self.tap.forward_hits > 0
    }

    /// Number of times the tap point was reached.
    pub fn forward_hits(&self) -> usize {
        self.tap.forward_hits
    }

    /// Read the retained activation and the gradient that flowed into it.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::CaptureMiss`] if the tap never fired, no
    /// gradient reached it, or the activation and gradient disagree in shape.
    pub fn collect(&mut self, grads: &B::Gradients) -> Result<CapturedPair<B::InnerBackend>> {
        let path = self.tap.point.path.clone();
        let retained = self
            .tap
            .retained
            .take()
            .ok_or_else(|| ExplainError::CaptureMiss(format!("tap point {path} never fired")))?;
        let no_grad = || ExplainError::CaptureMiss(format!("no gradient reached {path}"));

        match retained {
            Retained::Map(leaf) => {
                let gradient = leaf.grad(grads).ok_or_else(no_grad)?;
                CapturedPair::new(first_map(leaf.inner())?, first_map(gradient)?)
            }
            Retained::Tokens { leaf, grid } => {
                let gradient = leaf.grad(grads).ok_or_else(no_grad)?;
                CapturedPair::new(tokens_to_map(leaf.inner(), grid)?, tokens_to_map(gradient, grid)?)
            }
        }
    }
}

impl<B: AutodiffBackend> Drop for TapSession<'_, B> {
    fn drop(&mut self) {
        self.tap.retained = None;
    }
}

impl<B: AutodiffBackend> LayerObserver<B> for TapSession<'_, B> {
    fn on_feature_map(&mut self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        if layer != self.tap.point.path {
            return output;
        }
        let leaf = output.detach().require_grad();
        self.tap.retain(layer, Retained::Map(leaf.clone()));
        leaf
    }

    fn on_tokens(&mut self, layer: &str, output: Tensor<B, 3>, grid: [usize; 2]) -> Tensor<B, 3> {
        if layer != self.tap.point.path {
            return output;
        }
        let leaf = output.detach().require_grad();
        self.tap.retain(
            layer,
            Retained::Tokens {
                leaf: leaf.clone(),
                grid,
            },
        );
        leaf
    }
}

/// First batch item of a (batch, C, H, W) map.
fn first_map<B: Backend>(tensor: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
    let [batch, c, h, w] = tensor.dims();
    if batch == 0 {
        return Err(ExplainError::CaptureMiss("empty batch at tap point".into()));
    }
    Ok(tensor.slice([0..1, 0..c, 0..h, 0..w]).reshape([c, h, w]))
}

/// First batch item of a (batch, seq, hidden) sequence as (hidden, gh, gw).
///
/// A single leading token beyond the patch grid (a class token) is dropped.
fn tokens_to_map<B: Backend>(tensor: Tensor<B, 3>, grid: [usize; 2]) -> Result<Tensor<B, 3>> {
    let [batch, seq, hidden] = tensor.dims();
    let [gh, gw] = grid;
    let cells = gh * gw;
    if batch == 0 || cells == 0 || seq < cells || seq > cells + 1 {
        return Err(ExplainError::CaptureMiss(format!(
            "sequence of {seq} tokens does not fit a {gh}x{gw} grid"
        )));
    }
    let skip = seq - cells;
    Ok(tensor
        .slice([0..1, skip..seq, 0..hidden])
        .reshape([cells, hidden])
        .swap_dims(0, 1)
        .reshape([hidden, gh, gw]))
}
