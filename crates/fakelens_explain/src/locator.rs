//! Tap point selection.
//!
//! The search runs once per classifier over its declared layer inventory:
//! last `Conv2d` inside the vision subnetwork, else the last block of the
//! deepest encoder, else that encoder, else the vision subnetwork itself.

use fakelens_core::{LayerInfo, LayerKind};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Which search rule selected a tap point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapSelection {
    /// Last convolution of the vision subnetwork.
    LastConv,
    /// Last block of the deepest encoder.
    LastEncoderBlock,
    /// The deepest encoder, which has no blocks.
    Encoder,
    /// The vision subnetwork as a whole.
    VisionRoot,
    /// Chosen explicitly by the caller.
    Manual,
}

/// The single layer whose output and incoming gradient are captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPoint {
    /// Layer path, as reported by the classifier.
    pub path: String,
    /// Layer kind.
    pub kind: LayerKind,
    /// Rule that selected this layer.
    pub selection: TapSelection,
}

impl TapPoint {
    /// A tap point chosen by the caller.
    pub fn manual(path: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            path: path.into(),
            kind,
            selection: TapSelection::Manual,
        }
    }

    fn from_layer(layer: &LayerInfo, selection: TapSelection) -> Self {
        Self {
            path: layer.path.clone(),
            kind: layer.kind,
            selection,
        }
    }
}

/// Select the tap point from a classifier's layer inventory.
///
/// # Errors
///
/// Returns [`ExplainError::ModelTopology`] if no layer of kind
/// [`LayerKind::Vision`] exists.
pub fn locate_tap_point(layers: &[LayerInfo]) -> Result<TapPoint> {
    let vision = layers
        .iter()
        .find(|l| l.kind == LayerKind::Vision)
        .ok_or_else(|| {
            ExplainError::ModelTopology(format!(
                "no vision subnetwork among {} layers",
                layers.len()
            ))
        })?;

    let inside: Vec<&LayerInfo> = layers.iter().filter(|l| l.is_within(&vision.path)).collect();

    if let Some(conv) = inside.iter().rev().find(|l| l.kind == LayerKind::Conv2d) {
        return Ok(TapPoint::from_layer(conv, TapSelection::LastConv));
    }

    // Deepest encoder; on equal depth the later one wins
    let encoder = inside
        .iter()
        .filter(|l| l.kind == LayerKind::Encoder)
        .fold(None::<&&LayerInfo>, |best, l| match best {
            Some(b) if b.depth() > l.depth() => Some(b),
            _ => Some(l),
        });

    if let Some(encoder) = encoder {
        let last_block = inside
            .iter()
            .rev()
            .find(|l| l.kind == LayerKind::EncoderBlock && l.is_within(&encoder.path));
        return Ok(match last_block {
            Some(block) => TapPoint::from_layer(block, TapSelection::LastEncoderBlock),
            None => TapPoint::from_layer(encoder, TapSelection::Encoder),
        });
    }

    Ok(TapPoint::from_layer(vision, TapSelection::VisionRoot))
}
