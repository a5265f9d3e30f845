//! Saliency strategies and their tagged results.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use fakelens_core::VisionClassifier;

use crate::config::SaliencyMethod;
use crate::map::ImportanceMap;

/// A normalized importance map together with how it was made.
#[derive(Debug, Clone, PartialEq)]
pub struct Saliency {
    /// Map in [0, 1] at the strategy's native resolution.
    pub map: ImportanceMap,
    /// Producing method.
    pub method: SaliencyMethod,
    /// Blend factor the overlay should use for this map.
    pub alpha: f32,
}

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// A usable map.
    Produced(Saliency),
    /// The strategy could not run; the reason is for logging only.
    NotApplicable(String),
}

impl Attempt {
    /// Shorthand for [`Attempt::NotApplicable`].
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::NotApplicable(reason.into())
    }

    /// The produced saliency, if any.
    pub fn produced(self) -> Option<Saliency> {
        match self {
            Self::Produced(saliency) => Some(saliency),
            Self::NotApplicable(_) => None,
        }
    }
}

/// Inputs shared by every strategy for one explanation.
#[derive(Debug, Clone)]
pub struct SaliencyRequest<B: AutodiffBackend> {
    /// Preprocessed input, shape (1, 3, size, size).
    pub pixels: Tensor<B, 4>,
    /// Class whose score is explained.
    pub target_class: usize,
    /// `[width, height]` of the original image.
    pub original_size: [u32; 2],
}

/// One way of producing an importance map.
pub trait SaliencyStrategy<B: AutodiffBackend>: Send + Sync {
    /// Which method this strategy implements.
    fn method(&self) -> SaliencyMethod;

    /// Try to produce a map. Never panics on unsupported models; reports
    /// [`Attempt::NotApplicable`] instead.
    fn try_produce(
        &self,
        classifier: &dyn VisionClassifier<B>,
        request: &SaliencyRequest<B>,
    ) -> Attempt;
}

/// Run `strategies` in order and return the first produced map.
pub fn first_produced<B: AutodiffBackend>(
    strategies: &[Box<dyn SaliencyStrategy<B>>],
    classifier: &dyn VisionClassifier<B>,
    request: &SaliencyRequest<B>,
) -> Option<Saliency> {
    for strategy in strategies {
        match strategy.try_produce(classifier, request) {
            Attempt::Produced(saliency) => return Some(saliency),
            Attempt::NotApplicable(reason) => {
                tracing::warn!(method = ?strategy.method(), %reason, "saliency strategy not applicable");
            }
        }
    }
    None
}
