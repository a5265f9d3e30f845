//! The detection facade.

use std::path::Path;
use std::time::Instant;

use burn::module::Module;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::{ImageProcessor, ProcessorConfig, VisionClassifier};
use fakelens_explain::{Explainer, ExplainError, VisualizationArtifact};
use fakelens_models::{load_checkpoint, ViTClassifier};
use image::RgbImage;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::error::{DetectError, Result};
use crate::report::{
    DetectionReport, HealthReport, ModelInfo, Prediction, Probabilities, VisualizationReport,
};

/// A loaded classifier with its preprocessing and explanation pipeline.
///
/// Built once at startup and shared by request handlers. Burn modules are
/// `Send` but not `Sync`, so the model sits behind a mutex that is held only
/// long enough to clone it; each request runs on its own Arc-backed copy.
/// Classification takes no other lock; explanations are serialized inside
/// the explainer.
pub struct Detector<B: AutodiffBackend, M: VisionClassifier<B> + Clone> {
    model: Mutex<M>,
    processor: ImageProcessor,
    explainer: Option<Explainer<B>>,
    info: ModelInfo,
    config: DetectorConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Detector<B, ViTClassifier<B>> {
    /// Load the checkpoint named by `config.checkpoint_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Config`] if no checkpoint directory is set, or
    /// [`DetectError::Checkpoint`] if loading fails.
    pub fn from_checkpoint(config: DetectorConfig, device: B::Device) -> Result<Self> {
        let dir = config
            .checkpoint_dir
            .clone()
            .ok_or_else(|| DetectError::Config("no checkpoint directory configured".into()))?;
        Self::load(dir, config, device)
    }

    /// Load a checkpoint directory.
    pub fn load(dir: impl AsRef<Path>, config: DetectorConfig, device: B::Device) -> Result<Self> {
        let start = Instant::now();
        let (model, metadata) = load_checkpoint::<B>(dir.as_ref(), &device)?;
        let model_name = if metadata.model_name.is_empty() {
            config.model_name.clone()
        } else {
            metadata.model_name
        };
        let info = ModelInfo::new(model_name, metadata.arch)
            .with_device(config.device_name.clone())
            .with_parameters(model.num_params());
        info!(
            model = %info.model_name,
            parameters = model.num_params(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(Self::new(model, info, config, device))
    }
}

impl<B: AutodiffBackend, M: VisionClassifier<B> + Clone> Detector<B, M> {
    /// Wrap a classifier.
    ///
    /// A classifier without a locatable vision subnetwork still classifies;
    /// its reports carry no visualization.
    pub fn new(model: M, info: ModelInfo, config: DetectorConfig, device: B::Device) -> Self {
        let explainer = match Explainer::<B>::new(&model, config.explain.clone(), device.clone()) {
            Ok(explainer) => Some(explainer),
            Err(ExplainError::ModelTopology(reason)) => {
                warn!(%reason, "visualization disabled");
                None
            }
            Err(e) => {
                warn!(error = %e, "visualization disabled");
                None
            }
        };

        let mut info = info;
        info.tap_point = explainer.as_ref().map(|e| e.tap_point().path.clone());

        Self {
            processor: ImageProcessor::new(ProcessorConfig::new(model.image_size())),
            model: Mutex::new(model),
            explainer,
            info,
            config,
            device,
        }
    }

    /// A copy of the wrapped classifier sharing its weights.
    pub fn model(&self) -> M {
        self.model.lock().clone()
    }

    /// The explainer, if the model supports visualization.
    pub fn explainer(&self) -> Option<&Explainer<B>> {
        self.explainer.as_ref()
    }

    /// Detector configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Model description.
    pub fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    /// Liveness report.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            model_loaded: true,
            visualization_supported: self.explainer.is_some(),
            device: self.info.device.clone(),
        }
    }

    /// Decode image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::InvalidInput`] for empty input and
    /// [`DetectError::Decode`] for undecodable bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(DetectError::InvalidInput("no image data provided".into()));
        }
        Ok(self.processor.decode(bytes)?)
    }

    /// Classify encoded image bytes.
    pub fn classify(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = self.decode(bytes)?;
        self.classify_image(&image)
    }

    /// Classify a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Inference`] if the classifier output is not a
    /// finite probability pair.
    pub fn classify_image(&self, image: &RgbImage) -> Result<Prediction> {
        let prep_start = Instant::now();
        let pixels = self.processor.preprocess::<B>(image, &self.device);
        let preprocessing_ms = elapsed_ms(prep_start);

        let infer_start = Instant::now();
        let probs = self
            .model()
            .forward_probs(pixels)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| DetectError::Inference(format!("{e:?}")))?;
        let inference_ms = elapsed_ms(infer_start);

        let (fake, real) = match probs.as_slice() {
            [fake, real, ..] if fake.is_finite() && real.is_finite() => (*fake, *real),
            other => {
                return Err(DetectError::Inference(format!(
                    "expected two finite class probabilities, got {other:?}"
                )))
            }
        };

        let mut prediction =
            Prediction::from_probabilities(Probabilities { fake, real }, [image.width(), image.height()]);
        prediction.preprocessing_ms = preprocessing_ms;
        prediction.inference_ms = inference_ms;

        info!(
            label = %prediction.label,
            fake = fake,
            real = real,
            inference_ms,
            "classified image"
        );
        Ok(prediction)
    }

    /// Explain a prediction. `None` when visualization is unsupported.
    pub fn explain(&self, image: &RgbImage, prediction: &Prediction) -> Option<VisualizationArtifact> {
        let explainer = self.explainer.as_ref()?;
        explainer.explain(&self.model(), image, &prediction.verdict())
    }

    /// Classify and optionally explain encoded image bytes.
    ///
    /// `with_visualization` overrides the configured default when set.
    pub fn detect(&self, bytes: &[u8], with_visualization: Option<bool>) -> Result<DetectionReport> {
        self.analyze(bytes, with_visualization).map(|(report, _)| report)
    }

    /// Like [`detect`](Self::detect), also returning the rendered artifact.
    pub fn analyze(
        &self,
        bytes: &[u8],
        with_visualization: Option<bool>,
    ) -> Result<(DetectionReport, Option<VisualizationArtifact>)> {
        let start = Instant::now();
        let image = self.decode(bytes)?;
        let prediction = self.classify_image(&image)?;
        let total_ms = elapsed_ms(start);

        let (visualization, artifact) = if with_visualization.unwrap_or(self.config.visualize) {
            let viz_start = Instant::now();
            match self.explain(&image, &prediction) {
                Some(artifact) => (
                    VisualizationReport::from_artifact(&artifact, elapsed_ms(viz_start)),
                    Some(artifact),
                ),
                None => (
                    VisualizationReport::unavailable("Heatmap visualization not available"),
                    None,
                ),
            }
        } else {
            (VisualizationReport::unavailable("Visualization not requested"), None)
        };

        let report = DetectionReport::new(&prediction, self.info.clone(), total_ms, visualization);
        Ok((report, artifact))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::prelude::*;
    use fakelens_core::backend::DefaultBackend;
    use fakelens_core::{Label, LayerInfo, LayerKind, LayerObserver};
    use fakelens_explain::encode_png;
    use fakelens_models::{save_checkpoint, CheckpointMetadata, ViTClassifierConfig};
    use image::Rgb;

    type B = DefaultBackend;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 3) as u8, (y * 3) as u8, 60]));
        encode_png(&img).unwrap()
    }

    fn tiny_detector() -> Detector<B, ViTClassifier<B>> {
        let device = Default::default();
        let model = ViTClassifierConfig::new(32, 8)
            .with_encoder(16, 2, 1, 32)
            .init::<B>(&device);
        Detector::new(
            model,
            ModelInfo::new("tiny", "ViTClassifier"),
            DetectorConfig::default(),
            device,
        )
    }

    /// Fixed logits, no vision subnetwork.
    #[derive(Clone)]
    struct Constant([f32; 2]);

    impl VisionClassifier<B> for Constant {
        fn num_classes(&self) -> usize {
            2
        }

        fn image_size(&self) -> usize {
            8
        }

        fn layers(&self) -> Vec<LayerInfo> {
            vec![LayerInfo::new("head", LayerKind::Linear)]
        }

        fn forward_observed(
            &self,
            pixels: Tensor<B, 4>,
            _observer: &mut dyn LayerObserver<B>,
        ) -> Tensor<B, 2> {
            Tensor::<B, 1>::from_floats(self.0, &pixels.device()).reshape([1, 2])
        }

        fn encoder_features(&self, _pixels: Tensor<B, 4>) -> Option<Tensor<B, 3>> {
            None
        }
    }

    #[test]
    fn test_classify_probabilities_sum_to_one() {
        let detector = tiny_detector();
        let prediction = detector.classify(&png_bytes(40, 30)).unwrap();
        let sum = prediction.probabilities.fake + prediction.probabilities.real;
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(prediction.image_size, [40, 30]);
        assert_eq!(prediction.confidence, prediction.probabilities.of(prediction.label));
    }

    #[test]
    fn test_classify_rejects_bad_input() {
        let detector = tiny_detector();
        assert!(matches!(detector.classify(&[]), Err(DetectError::InvalidInput(_))));
        assert!(matches!(
            detector.classify(b"definitely not an image"),
            Err(DetectError::Decode(_))
        ));
    }

    #[test]
    fn test_detect_with_visualization() {
        let detector = tiny_detector();
        let report = detector.detect(&png_bytes(48, 36), Some(true)).unwrap();

        assert!(report.success);
        assert!(report.visualization.available);
        let overlay = report.visualization.heatmap_overlay.as_deref().unwrap();
        assert!(overlay.starts_with("data:image/png;base64,"));
        assert_eq!(report.analysis.image_size, [48, 36]);
        assert_eq!(report.model_info.tap_point.as_deref(), Some("vision.embeddings.patch_embedding"));
    }

    #[test]
    fn test_detect_without_visualization() {
        let detector = tiny_detector();
        let report = detector.detect(&png_bytes(16, 16), Some(false)).unwrap();
        assert!(!report.visualization.available);
        assert!(report.visualization.original_image.is_none());
    }

    #[test]
    fn test_analyze_returns_artifact() {
        let detector = tiny_detector();
        let (report, artifact) = detector.analyze(&png_bytes(20, 12), None).unwrap();
        let artifact = artifact.unwrap();
        assert_eq!((artifact.width, artifact.height), (20, 12));
        assert_eq!(report.visualization.method, artifact.method);

        let (_, none) = detector.analyze(&png_bytes(20, 12), Some(false)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_topology_error_keeps_classification() {
        let detector = Detector::<B, _>::new(
            Constant([2.0, 0.0]),
            ModelInfo::new("constant", "Constant"),
            DetectorConfig::default(),
            Default::default(),
        );
        assert!(!detector.health().visualization_supported);
        assert!(detector.model_info().tap_point.is_none());

        let report = detector.detect(&png_bytes(10, 10), Some(true)).unwrap();
        assert_eq!(report.prediction, Label::Fake);
        assert!(!report.visualization.available);
        assert!(report.interpretation.contains("highly confident"));
    }

    #[test]
    fn test_load_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = ViTClassifierConfig::new(32, 8).with_encoder(16, 2, 1, 32);
        let model = config.init::<B>(&device);
        save_checkpoint(&model, &CheckpointMetadata::new(&config).with_model_name("saved"), dir.path())
            .unwrap();

        let detector_config = DetectorConfig::default().with_checkpoint_dir(dir.path());
        let detector = Detector::<B, ViTClassifier<B>>::from_checkpoint(detector_config, device).unwrap();
        assert_eq!(detector.model_info().model_name, "saved");
        assert_eq!(detector.model_info().parameters, Some(model.num_params()));
        assert!(detector.health().model_loaded);
    }

    #[test]
    fn test_checkpoint_without_name_uses_config_name() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = ViTClassifierConfig::new(32, 8).with_encoder(16, 2, 1, 32);
        let model = config.init::<B>(&device);
        save_checkpoint(&model, &CheckpointMetadata::new(&config).with_model_name(""), dir.path())
            .unwrap();

        let detector_config = DetectorConfig::default()
            .with_checkpoint_dir(dir.path())
            .with_model_name("configured");
        let detector = Detector::<B, ViTClassifier<B>>::from_checkpoint(detector_config, device).unwrap();
        assert_eq!(detector.model_info().model_name, "configured");
    }

    #[test]
    fn test_detector_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Detector<B, ViTClassifier<B>>>();
    }

    #[test]
    fn test_concurrent_detection_with_vit() {
        let detector = tiny_detector();
        let pngs: Vec<Vec<u8>> = (0..4).map(|i| png_bytes(24 + i * 8, 20)).collect();

        let shared = &detector;
        let reports: Vec<DetectionReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = pngs
                .iter()
                .map(|png| scope.spawn(move || shared.detect(png, Some(true)).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.analysis.image_size, [24 + i as u32 * 8, 20]);
            assert!(report.visualization.available);
        }

        // Classification alone still works after the explanations.
        let prediction = detector.classify(&pngs[0]).unwrap();
        let sum = prediction.probabilities.fake + prediction.probabilities.real;
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_from_checkpoint_requires_dir() {
        let result = Detector::<B, ViTClassifier<B>>::from_checkpoint(
            DetectorConfig::default(),
            Default::default(),
        );
        assert!(matches!(result, Err(DetectError::Config(_))));
    }
}
