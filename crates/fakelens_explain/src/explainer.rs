//! The explanation pipeline.

use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use fakelens_core::{ImageProcessor, ProcessorConfig, Verdict, VisionClassifier};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::composite::render;
use crate::config::{ExplainConfig, SaliencyMethod};
use crate::encode::VisualizationArtifact;
use crate::error::Result;
use crate::fallback::FeatureMagnitude;
use crate::locator::{locate_tap_point, TapPoint};
use crate::saliency::GradCam;
use crate::strategy::{first_produced, Saliency, SaliencyRequest, SaliencyStrategy};

/// Produces visual explanations for one classifier.
///
/// The tap point is resolved once at construction. [`explain`](Self::explain)
/// never fails: if no strategy yields a map, the artifact is the original
/// image twice.
///
/// # Example
///
/// ```rust,ignore
/// let explainer = Explainer::new(&model, ExplainConfig::default(), device)?;
/// let artifact = explainer.explain(&model, &image, &Verdict::fake());
/// ```
pub struct Explainer<B: AutodiffBackend> {
    config: ExplainConfig,
    processor: ImageProcessor,
    tap_point: TapPoint,
    strategies: Vec<Box<dyn SaliencyStrategy<B>>>,
    device: B::Device,
}

impl<B: AutodiffBackend> Explainer<B> {
    /// Locate the tap point of `classifier` and build the configured strategies.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::ModelTopology`](crate::ExplainError::ModelTopology)
    /// if the classifier has no vision subnetwork.
    pub fn new(
        classifier: &dyn VisionClassifier<B>,
        config: ExplainConfig,
        device: B::Device,
    ) -> Result<Self> {
        let tap_point = locate_tap_point(&classifier.layers())?;
        info!(
            path = %tap_point.path,
            kind = ?tap_point.kind,
            selection = ?tap_point.selection,
            "tap point selected"
        );
        Ok(Self::with_tap_point(classifier, tap_point, config, device))
    }

    /// Build an explainer around an explicit tap point.
    pub fn with_tap_point(
        classifier: &dyn VisionClassifier<B>,
        tap_point: TapPoint,
        config: ExplainConfig,
        device: B::Device,
    ) -> Self {
        let strategies = config
            .strategies
            .iter()
            .map(|&method| -> Box<dyn SaliencyStrategy<B>> {
                let alpha = config.alpha_for(method);
                match method {
                    SaliencyMethod::GradCam => Box::new(GradCam::<B>::new(tap_point.clone(), alpha)),
                    SaliencyMethod::FeatureMagnitude => Box::new(FeatureMagnitude::new(
                        alpha,
                        config.coarse_cell,
                        config.epsilon,
                    )),
                }
            })
            .collect();

        Self {
            processor: ImageProcessor::new(ProcessorConfig::new(classifier.image_size())),
            config,
            tap_point,
            strategies,
            device,
        }
    }

    /// Replace the strategy list.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn SaliencyStrategy<B>>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// The selected tap point.
    pub fn tap_point(&self) -> &TapPoint {
        &self.tap_point
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// Methods of the configured strategies, in the order they are tried.
    pub fn methods(&self) -> Vec<SaliencyMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Run the strategies in order and return the first map produced.
    pub fn saliency(
        &self,
        classifier: &dyn VisionClassifier<B>,
        image: &RgbImage,
        verdict: &Verdict,
    ) -> Option<Saliency> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let request = SaliencyRequest {
            pixels: self.processor.preprocess::<B>(image, &self.device),
            target_class: verdict.target_class,
            original_size: [width, height],
        };
        first_produced(&self.strategies, classifier, &request)
    }

    /// Explain `verdict` for `image`.
    ///
    /// Returns the original and overlay PNGs at the image's dimensions.
    /// `None` only if even the original cannot be encoded.
    pub fn explain(
        &self,
        classifier: &dyn VisionClassifier<B>,
        image: &RgbImage,
        verdict: &Verdict,
    ) -> Option<VisualizationArtifact> {
        let start = Instant::now();

        let artifact = self
            .saliency(classifier, image, verdict)
            .and_then(|saliency| {
                let encoded = render(image, &saliency, verdict.is_fake, &self.config).and_then(
                    |rendered| VisualizationArtifact::encode(image, &rendered.overlay, saliency.method),
                );
                encoded
                    .map_err(|e| warn!(method = ?saliency.method, error = %e, "rendering failed"))
                    .ok()
            });

        let artifact = match artifact {
            Some(artifact) => artifact,
            None => {
                warn!("no saliency strategy succeeded, returning original image");
                VisualizationArtifact::passthrough(image)
                    .map_err(|e| warn!(error = %e, "could not encode original image"))
                    .ok()?
            }
        };

        debug!(
            label = %verdict.label,
            method = ?artifact.method,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "explanation ready"
        );
        Some(artifact)
    }
}
