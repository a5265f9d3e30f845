//! Explanation pipeline configuration.

use serde::{Deserialize, Serialize};

/// Saliency method producing an importance map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaliencyMethod {
    /// Gradient-weighted class activation mapping at the tap point.
    GradCam,
    /// Mean absolute encoder feature per patch (forward only).
    FeatureMagnitude,
}

/// Band thresholds for the fake colorization policy.
///
/// Percentiles are computed over the strictly positive map values. The clamp
/// rules keep bands visible on degenerate distributions: when a percentile
/// exceeds `trigger x max` it is replaced by `ratio x max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandPolicy {
    /// Percentile at or above which a value is painted red.
    pub high_percentile: f32,
    /// Percentile at or above which a value is painted yellow.
    pub medium_percentile: f32,
    /// Fraction of the max above which the high threshold is clamped.
    pub high_clamp_trigger: f32,
    /// Fraction of the max the high threshold is clamped to.
    pub high_clamp_ratio: f32,
    /// Fraction of the max above which the medium threshold is clamped.
    pub medium_clamp_trigger: f32,
    /// Fraction of the max the medium threshold is clamped to.
    pub medium_clamp_ratio: f32,
}

impl Default for BandPolicy {
    fn default() -> Self {
        Self {
            high_percentile: 50.0,
            medium_percentile: 20.0,
            high_clamp_trigger: 0.9,
            high_clamp_ratio: 0.6,
            medium_clamp_trigger: 0.8,
            medium_clamp_ratio: 0.3,
        }
    }
}

/// Configuration for [`Explainer`](crate::Explainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Percentile below which saliency is treated as noise.
    pub threshold_percentile: f32,
    /// Fake band thresholds.
    pub bands: BandPolicy,
    /// Blend factor for gradient-based maps.
    pub alpha: f32,
    /// Blend factor for the feature magnitude fallback.
    pub fallback_alpha: f32,
    /// Pixels per cell of the coarse uniform fallback grid.
    pub coarse_cell: u32,
    /// Epsilon guarding min-max normalization.
    pub epsilon: f32,
    /// Saliency strategies, tried in order.
    pub strategies: Vec<SaliencyMethod>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: 70.0,
            bands: BandPolicy::default(),
            alpha: 0.5,
            fallback_alpha: 0.35,
            coarse_cell: 16,
            epsilon: 1e-8,
            strategies: vec![SaliencyMethod::GradCam, SaliencyMethod::FeatureMagnitude],
        }
    }
}

impl ExplainConfig {
    /// Set the noise threshold percentile.
    #[must_use]
    pub fn with_threshold_percentile(mut self, percentile: f32) -> Self {
        self.threshold_percentile = percentile;
        self
    }

    /// Set the fake band policy.
    #[must_use]
    pub fn with_bands(mut self, bands: BandPolicy) -> Self {
        self.bands = bands;
        self
    }

    /// Set the strategy order.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<SaliencyMethod>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Blend factor for maps produced by `method`.
    pub fn alpha_for(&self, method: SaliencyMethod) -> f32 {
        match method {
            SaliencyMethod::GradCam => self.alpha,
            SaliencyMethod::FeatureMagnitude => self.fallback_alpha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_config_default() {
        let config = ExplainConfig::default();
        assert_eq!(config.threshold_percentile, 70.0);
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.coarse_cell, 16);
        assert_eq!(
            config.strategies,
            vec![SaliencyMethod::GradCam, SaliencyMethod::FeatureMagnitude]
        );
    }

    #[test]
    fn test_band_policy_default() {
        let bands = BandPolicy::default();
        assert_eq!(bands.high_percentile, 50.0);
        assert_eq!(bands.medium_percentile, 20.0);
        assert_eq!(bands.high_clamp_ratio, 0.6);
        assert_eq!(bands.medium_clamp_ratio, 0.3);
    }

    #[test]
    fn test_alpha_for_method() {
        let config = ExplainConfig::default();
        assert_eq!(config.alpha_for(SaliencyMethod::GradCam), 0.5);
        assert!(config.alpha_for(SaliencyMethod::FeatureMagnitude) < 0.5);
    }

    #[test]
    fn test_config_serde() {
        let config = ExplainConfig::default().with_threshold_percentile(80.0);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: ExplainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
        assert!(json.contains("\"grad_cam\""));
    }
}
