//! Prediction results and the serializable detection report.

use fakelens_core::{Label, Verdict};
use fakelens_explain::{SaliencyMethod, VisualizationArtifact};
use serde::{Deserialize, Serialize};

/// Confidence at or above which the model is "highly confident".
pub const HIGH_CONFIDENCE: f32 = 0.8;
/// Confidence at or above which the model is "moderately confident".
pub const MODERATE_CONFIDENCE: f32 = 0.6;

/// Class probabilities of one prediction, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    /// Probability of class 0.
    pub fake: f32,
    /// Probability of class 1.
    pub real: f32,
}

impl Probabilities {
    /// Probability of `label`.
    pub fn of(&self, label: Label) -> f32 {
        match label {
            Label::Fake => self.fake,
            Label::Real => self.real,
        }
    }

    /// Both values as rounded percentages.
    pub fn as_percent(&self) -> Self {
        Self {
            fake: to_percent(self.fake),
            real: to_percent(self.real),
        }
    }
}

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted label.
    pub label: Label,
    /// Probability of the predicted label, in [0, 1].
    pub confidence: f32,
    /// Per-class probabilities.
    pub probabilities: Probabilities,
    /// `[width, height]` of the decoded image.
    pub image_size: [u32; 2],
    /// Preprocessing time in milliseconds.
    pub preprocessing_ms: f64,
    /// Inference time in milliseconds.
    pub inference_ms: f64,
}

impl Prediction {
    /// Build a prediction from class probabilities. Ties resolve to real.
    pub fn from_probabilities(probabilities: Probabilities, image_size: [u32; 2]) -> Self {
        let label = Verdict::from_probabilities(probabilities.fake, probabilities.real).label;
        Self {
            label,
            confidence: probabilities.of(label),
            probabilities,
            image_size,
            preprocessing_ms: 0.0,
            inference_ms: 0.0,
        }
    }

    /// Verdict driving the explanation.
    pub fn verdict(&self) -> Verdict {
        Verdict::new(self.label)
    }

    /// Human-readable reading of the prediction.
    pub fn interpretation(&self) -> String {
        interpretation(self.label, self.confidence)
    }
}

/// Describe a prediction in words.
pub fn interpretation(label: Label, confidence: f32) -> String {
    let certainty = if confidence >= HIGH_CONFIDENCE {
        "highly confident"
    } else if confidence >= MODERATE_CONFIDENCE {
        "moderately confident"
    } else {
        "uncertain"
    };

    match label {
        Label::Real => format!(
            "The model is {certainty} that this image is authentic and not a deepfake."
        ),
        Label::Fake => format!(
            "The model is {certainty} that this image contains deepfake/manipulated content."
        ),
    }
}

/// Description of the loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name.
    pub model_name: String,
    /// Architecture name.
    pub model_type: String,
    /// Device the model runs on.
    pub device: String,
    /// Tensor framework.
    pub framework: String,
    /// Number of parameters, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<usize>,
    /// Label names in class-index order.
    pub labels: Vec<String>,
    /// Layer the explainer taps, when visualization is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap_point: Option<String>,
}

impl ModelInfo {
    /// Info for a named model of a given architecture.
    pub fn new(model_name: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_type: model_type.into(),
            device: "cpu".to_string(),
            framework: "burn".to_string(),
            parameters: None,
            labels: Label::ALL.iter().map(|l| l.as_str().to_string()).collect(),
            tap_point: None,
        }
    }

    /// Set the device name.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Set the parameter count.
    #[must_use]
    pub fn with_parameters(mut self, parameters: usize) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Always `"healthy"` for a constructed detector.
    pub status: String,
    /// Whether a model is loaded.
    pub model_loaded: bool,
    /// Whether visual explanations can be produced.
    pub visualization_supported: bool,
    /// Device name.
    pub device: String,
}

/// Timings and input facts of one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// `[width, height]` of the input image.
    pub image_size: [u32; 2],
    /// Inference time in milliseconds.
    pub inference_time: f64,
    /// Preprocessing time in milliseconds.
    pub preprocessing_time: f64,
    /// Classification time in milliseconds, excluding visualization.
    pub total_time: f64,
    /// RFC 3339 time the report was built, in UTC.
    pub timestamp: String,
}

/// Visualization block of a detection report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationReport {
    /// Whether images are attached.
    pub available: bool,
    /// Original image as a PNG data URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    /// Overlay as a PNG data URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap_overlay: Option<String>,
    /// Method behind the overlay; absent when the overlay is the original.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SaliencyMethod>,
    /// Visualization time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_time: Option<f64>,
    /// Reason when no images are attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VisualizationReport {
    /// Report attaching an artifact.
    pub fn from_artifact(artifact: &VisualizationArtifact, elapsed_ms: f64) -> Self {
        Self {
            available: true,
            original_image: Some(artifact.original_data_uri()),
            heatmap_overlay: Some(artifact.overlay_data_uri()),
            method: artifact.method,
            visualization_time: Some(round2(elapsed_ms)),
            message: None,
        }
    }

    /// Report without images.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            original_image: None,
            heatmap_overlay: None,
            method: None,
            visualization_time: None,
            message: Some(message.into()),
        }
    }
}

/// Full response for one detection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Always true; failures are returned as errors instead.
    pub success: bool,
    /// Predicted label.
    pub prediction: Label,
    /// Confidence in percent, two decimals.
    pub confidence: f32,
    /// Class probabilities in percent, two decimals.
    pub probabilities: Probabilities,
    /// Model description.
    pub model_info: ModelInfo,
    /// Timings.
    pub analysis: AnalysisReport,
    /// Human-readable reading.
    pub interpretation: String,
    /// Visual explanation.
    pub visualization: VisualizationReport,
}

impl DetectionReport {
    /// Assemble a report from its parts.
    pub fn new(
        prediction: &Prediction,
        model_info: ModelInfo,
        total_ms: f64,
        visualization: VisualizationReport,
    ) -> Self {
        Self {
            success: true,
            prediction: prediction.label,
            confidence: to_percent(prediction.confidence),
            probabilities: prediction.probabilities.as_percent(),
            model_info,
            analysis: AnalysisReport {
                image_size: prediction.image_size,
                inference_time: round2(prediction.inference_ms),
                preprocessing_time: round2(prediction.preprocessing_ms),
                total_time: round2(total_ms),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            interpretation: prediction.interpretation(),
            visualization,
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn to_percent(p: f32) -> f32 {
    (p * 10_000.0).round() / 100.0
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(fake: f32, real: f32) -> Prediction {
        Prediction::from_probabilities(Probabilities { fake, real }, [640, 480])
    }

    #[test]
    fn test_prediction_label() {
        let p = prediction(0.9, 0.1);
        assert_eq!(p.label, Label::Fake);
        assert_eq!(p.confidence, 0.9);
        assert_eq!(p.verdict(), Verdict::fake());

        let tie = prediction(0.5, 0.5);
        assert_eq!(tie.label, Label::Real);
    }

    #[test]
    fn test_interpretation_levels() {
        assert!(interpretation(Label::Fake, 0.95).contains("highly confident"));
        assert!(interpretation(Label::Fake, 0.8).contains("highly confident"));
        assert!(interpretation(Label::Real, 0.7).contains("moderately confident"));
        assert!(interpretation(Label::Real, 0.55).contains("uncertain"));
        assert!(interpretation(Label::Real, 0.9).contains("authentic"));
        assert!(interpretation(Label::Fake, 0.9).contains("deepfake/manipulated"));
    }

    #[test]
    fn test_report_json_shape() {
        let p = prediction(0.12345, 0.87655);
        let report = DetectionReport::new(
            &p,
            ModelInfo::new("fakelens-vit", "ViTClassifier"),
            12.3456,
            VisualizationReport::unavailable("Heatmap visualization not available"),
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["prediction"], "REAL");
        assert!((json["confidence"].as_f64().unwrap() - 87.66).abs() < 1e-3);
        assert!((json["probabilities"]["fake"].as_f64().unwrap() - 12.35).abs() < 1e-3);
        assert_eq!(json["analysis"]["image_size"][0], 640);
        assert_eq!(json["analysis"]["total_time"], 12.35);
        assert_eq!(json["visualization"]["available"], false);
        assert!(json["visualization"].get("heatmap_overlay").is_none());
        assert_eq!(json["model_info"]["labels"][0], "fake");

        let timestamp = json["analysis"]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
