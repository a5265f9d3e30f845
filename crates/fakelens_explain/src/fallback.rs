//! Forward-only attention estimate from encoder feature magnitudes.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::VisionClassifier;

use crate::config::SaliencyMethod;
use crate::error::{ExplainError, Result};
use crate::map::ImportanceMap;
use crate::strategy::{Attempt, Saliency, SaliencyRequest, SaliencyStrategy};

/// Mean absolute feature value per position of the first batch item.
///
/// # Arguments
///
/// * `features` - Encoder output of shape (batch, seq_len, hidden)
pub fn feature_magnitudes<B: Backend>(features: Tensor<B, 3>) -> Result<Vec<f32>> {
    let [batch, seq, hidden] = features.dims();
    if batch == 0 || seq == 0 || hidden == 0 {
        return Err(ExplainError::CaptureMiss(format!(
            "empty encoder output [{batch}, {seq}, {hidden}]"
        )));
    }
    features
        .slice([0..1, 0..seq, 0..hidden])
        .abs()
        .mean_dim(2)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::CaptureMiss(format!("unreadable encoder output: {e:?}")))
}

/// Side of the square grid a sequence of `len` positions forms, if any.
pub fn square_side(len: usize) -> Option<usize> {
    let side = (len as f64).sqrt().round() as usize;
    (side > 0 && side * side == len).then_some(side)
}

/// Arrange per-position magnitudes into a 2D map.
///
/// Perfect-square sequences become a `side x side` grid. Anything else yields
/// a uniform 0.5 map of `max(1, h / cell) x max(1, w / cell)` cells for an
/// original image of `[width, height]`.
pub fn magnitude_grid(magnitudes: Vec<f32>, original_size: [u32; 2], cell: u32) -> Result<ImportanceMap> {
    match square_side(magnitudes.len()) {
        Some(side) => ImportanceMap::from_vec(side, side, magnitudes),
        None => {
            let [width, height] = original_size;
            let cell = cell.max(1);
            let rows = (height / cell).max(1) as usize;
            let cols = (width / cell).max(1) as usize;
            Ok(ImportanceMap::filled(rows, cols, 0.5))
        }
    }
}

/// Feature magnitude strategy.
#[derive(Debug, Clone)]
pub struct FeatureMagnitude {
    alpha: f32,
    coarse_cell: u32,
    epsilon: f32,
}

impl FeatureMagnitude {
    /// Create the strategy.
    pub fn new(alpha: f32, coarse_cell: u32, epsilon: f32) -> Self {
        Self {
            alpha,
            coarse_cell,
            epsilon,
        }
    }

    fn estimate<B: AutodiffBackend>(
        &self,
        classifier: &dyn VisionClassifier<B>,
        request: &SaliencyRequest<B>,
    ) -> Result<ImportanceMap> {
        let features = classifier
            .encoder_features(request.pixels.clone())
            .ok_or_else(|| ExplainError::CaptureMiss("classifier exposes no encoder output".into()))?;
        let magnitudes = feature_magnitudes(features)?;
        let grid = magnitude_grid(magnitudes, request.original_size, self.coarse_cell)?;
        Ok(grid.normalize_min_max(self.epsilon))
    }
}

impl<B: AutodiffBackend> SaliencyStrategy<B> for FeatureMagnitude {
    fn method(&self) -> SaliencyMethod {
        SaliencyMethod::FeatureMagnitude
    }

    fn try_produce(
        &self,
        classifier: &dyn VisionClassifier<B>,
        request: &SaliencyRequest<B>,
    ) -> Attempt {
        match self.estimate(classifier, request) {
            Ok(map) => Attempt::Produced(Saliency {
                map,
                method: SaliencyMethod::FeatureMagnitude,
                alpha: self.alpha,
            }),
            Err(e) => Attempt::skip(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use fakelens_core::backend::DefaultBackend;
    use fakelens_core::{LayerInfo, LayerKind, LayerObserver};
    use fakelens_models::ViTClassifierConfig;

    type B = DefaultBackend;

    #[test]
    fn test_feature_magnitudes() {
        let device = Default::default();
        let data = vec![1.0, -3.0, 0.0, 0.0, -2.0, 2.0];
        let features = Tensor::<B, 3>::from_data(TensorData::new(data, [1, 3, 2]), &device);

        let mags = feature_magnitudes(features).unwrap();
        assert_eq!(mags, vec![2.0, 0.0, 2.0]);
    }

    #[test]
    fn test_square_side() {
        assert_eq!(square_side(196), Some(14));
        assert_eq!(square_side(1), Some(1));
        assert_eq!(square_side(197), None);
        assert_eq!(square_side(0), None);
    }

    #[test]
    fn test_magnitude_grid_square() {
        let grid = magnitude_grid((0..16).map(|v| v as f32).collect(), [100, 100], 16).unwrap();
        assert_eq!(grid.shape(), [4, 4]);
        assert_eq!(grid.get(1, 2), 6.0);
    }

    #[test]
    fn test_magnitude_grid_coarse_uniform() {
        let grid = magnitude_grid(vec![1.0; 197], [320, 160], 16).unwrap();
        assert_eq!(grid.shape(), [10, 20]);
        assert!(grid.values().iter().all(|&v| v == 0.5));

        let tiny = magnitude_grid(vec![1.0; 3], [8, 8], 16).unwrap();
        assert_eq!(tiny.shape(), [1, 1]);
    }

    #[test]
    fn test_feature_magnitude_on_vit() {
        let device = Default::default();
        let model = ViTClassifierConfig::new(32, 8)
            .with_encoder(16, 2, 1, 32)
            .init::<B>(&device);
        let request = SaliencyRequest {
            pixels: Tensor::random(
                [1, 3, 32, 32],
                burn::tensor::Distribution::Uniform(-1.0, 1.0),
                &device,
            ),
            target_class: 1,
            original_size: [50, 40],
        };

        let strategy = FeatureMagnitude::new(0.35, 16, 1e-8);
        let saliency = SaliencyStrategy::<B>::try_produce(&strategy, &model, &request)
            .produced()
            .unwrap();
        assert_eq!(saliency.method, SaliencyMethod::FeatureMagnitude);
        assert_eq!(saliency.alpha, 0.35);
        assert_eq!(saliency.map.shape(), [4, 4]);
        assert!(saliency.map.min() >= 0.0);
        assert!(saliency.map.max() <= 1.0);
    }

    struct Headless;

    impl VisionClassifier<B> for Headless {
        fn num_classes(&self) -> usize {
            2
        }

        fn image_size(&self) -> usize {
            8
        }

        fn layers(&self) -> Vec<LayerInfo> {
            vec![LayerInfo::new("vision", LayerKind::Vision)]
        }

        fn forward_observed(
            &self,
            pixels: Tensor<B, 4>,
            _observer: &mut dyn LayerObserver<B>,
        ) -> Tensor<B, 2> {
            Tensor::zeros([pixels.dims()[0], 2], &pixels.device())
        }

        fn encoder_features(&self, _pixels: Tensor<B, 4>) -> Option<Tensor<B, 3>> {
            None
        }
    }

    #[test]
    fn test_feature_magnitude_without_encoder() {
        let request = SaliencyRequest {
            pixels: Tensor::zeros([1, 3, 8, 8], &Default::default()),
            target_class: 0,
            original_size: [8, 8],
        };
        let strategy = FeatureMagnitude::new(0.35, 16, 1e-8);
        let attempt = SaliencyStrategy::<B>::try_produce(&strategy, &Headless, &request);
        assert!(matches!(attempt, Attempt::NotApplicable(_)));
    }
}
