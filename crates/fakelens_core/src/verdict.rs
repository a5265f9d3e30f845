//! Binary verdict types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output label of a deepfake classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    /// Manipulated or synthesized image (class 0).
    Fake,
    /// Authentic image (class 1).
    Real,
}

impl Label {
    /// All labels in class-index order.
    pub const ALL: [Label; 2] = [Label::Fake, Label::Real];

    /// Class index of this label in the classifier output.
    pub const fn class_index(self) -> usize {
        match self {
            Label::Fake => 0,
            Label::Real => 1,
        }
    }

    /// Label for a class index.
    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lowercase name, as used in probability maps.
    pub const fn as_str(self) -> &'static str {
        match self {
            Label::Fake => "fake",
            Label::Real => "real",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Fake => f.write_str("FAKE"),
            Label::Real => f.write_str("REAL"),
        }
    }
}

/// A classification outcome as consumed by the explanation engine.
///
/// `target_class` selects which logit is backpropagated; `is_fake` selects
/// the colorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// The predicted label.
    pub label: Label,
    /// Class index used for class-conditional backpropagation.
    pub target_class: usize,
    /// Whether the fake colorization policy applies.
    pub is_fake: bool,
}

impl Verdict {
    /// Create a verdict for a label.
    pub const fn new(label: Label) -> Self {
        Self {
            label,
            target_class: label.class_index(),
            is_fake: matches!(label, Label::Fake),
        }
    }

    /// Verdict for a fake prediction.
    pub const fn fake() -> Self {
        Self::new(Label::Fake)
    }

    /// Verdict for a real prediction.
    pub const fn real() -> Self {
        Self::new(Label::Real)
    }

    /// Verdict from class probabilities. Ties resolve to real.
    pub fn from_probabilities(fake: f32, real: f32) -> Self {
        if fake > real {
            Self::fake()
        } else {
            Self::real()
        }
    }
}

impl From<Label> for Verdict {
    fn from(label: Label) -> Self {
        Self::new(label)
    }
}
