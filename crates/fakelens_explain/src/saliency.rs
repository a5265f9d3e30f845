//! Gradient-weighted class activation mapping.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::VisionClassifier;
use parking_lot::Mutex;

use crate::config::SaliencyMethod;
use crate::error::{ExplainError, Result};
use crate::locator::TapPoint;
use crate::map::ImportanceMap;
use crate::strategy::{Attempt, Saliency, SaliencyRequest, SaliencyStrategy};
use crate::tap::{CapturedPair, FeatureTap};

/// Compute a Grad-CAM map from a captured pair.
///
/// Per-channel weights are the spatial mean of the gradient; the map is the
/// weighted sum of activation channels, clipped at zero and divided by its
/// max when the max is positive.
///
/// # Arguments
///
/// * `pair` - Activation and gradient, each (channels, height, width)
///
/// # Returns
///
/// Importance map of shape (height, width) in [0, 1].
pub fn grad_cam<B: Backend>(pair: CapturedPair<B>) -> Result<ImportanceMap> {
    let [_, h, w] = pair.dims();

    // (C, H, W) -> (C, 1, 1)
    let weights = pair.gradient.mean_dim(2).mean_dim(1);

    // (C, H, W) -> (1, H, W)
    let cam = (pair.activation * weights).sum_dim(0).reshape([h, w]);
    let cam = cam.clamp_min(0.0);

    let values = cam
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::CaptureMiss(format!("unreadable saliency data: {e:?}")))?;
    if values.iter().any(|v| v.is_infinite()) {
        return Err(ExplainError::CaptureMiss("saliency map is not finite".into()));
    }

    Ok(ImportanceMap::from_vec(h, w, values)?.relu().normalize_max())
}

/// Grad-CAM at a fixed tap point.
///
/// The tap is held behind a mutex for the whole forward/backward pass, so
/// concurrent explanations through one strategy are serialized.
pub struct GradCam<B: AutodiffBackend> {
    tap: Mutex<FeatureTap<B>>,
    alpha: f32,
}

impl<B: AutodiffBackend> GradCam<B> {
    /// Create the strategy for `point`, blending with `alpha`.
    pub fn new(point: TapPoint, alpha: f32) -> Self {
        Self {
            tap: Mutex::new(FeatureTap::new(point)),
            alpha,
        }
    }

    /// The tapped layer.
    pub fn tap_point(&self) -> TapPoint {
        self.tap.lock().point().clone()
    }

    fn capture(
        &self,
        classifier: &dyn VisionClassifier<B>,
        request: &SaliencyRequest<B>,
    ) -> Result<CapturedPair<B::InnerBackend>> {
        let mut tap = self.tap.lock();
        let mut session = tap.arm();

        let logits = classifier.forward_observed(request.pixels.clone(), &mut session);
        if !session.fired() {
            return Err(ExplainError::CaptureMiss(
                "tap point not reached during forward pass".into(),
            ));
        }

        let c = request.target_class;
        let score = logits.slice([0..1, c..c + 1]).sum();
        let grads = score.backward();
        session.collect(&grads)
    }
}

impl<B: AutodiffBackend> SaliencyStrategy<B> for GradCam<B> {
    fn method(&self) -> SaliencyMethod {
        SaliencyMethod::GradCam
    }

    fn try_produce(
        &self,
        classifier: &dyn VisionClassifier<B>,
        request: &SaliencyRequest<B>,
    ) -> Attempt {
        let n_classes = classifier.num_classes();
        if request.target_class >= n_classes {
            return Attempt::skip(format!(
                "target class {} outside 0..{n_classes}",
                request.target_class
            ));
        }

        let map = self.capture(classifier, request).and_then(grad_cam);
        match map {
            Ok(map) => {
                tracing::debug!(shape = ?map.shape(), max = map.max(), "grad-cam map computed");
                Attempt::Produced(Saliency {
                    map,
                    method: SaliencyMethod::GradCam,
                    alpha: self.alpha,
                })
            }
            Err(e) => Attempt::skip(e.to_string()),
        }
    }
}
