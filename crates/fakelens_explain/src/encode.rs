//! PNG encoding and the visualization artifact.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::SaliencyMethod;
use crate::error::Result;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Encode an RGB image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Wrap PNG bytes in a base64 `data:` URI.
pub fn to_data_uri(png: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png))
}

/// Original and overlay encodings of one explanation.
///
/// Both images have the dimensions of the explained input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationArtifact {
    /// PNG of the unmodified input.
    pub original_png: Vec<u8>,
    /// PNG of the overlay.
    pub overlay_png: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Method behind the overlay; `None` when every strategy failed and the
    /// overlay is the original image.
    pub method: Option<SaliencyMethod>,
}

impl VisualizationArtifact {
    /// Encode an original/overlay pair.
    pub fn encode(original: &RgbImage, overlay: &RgbImage, method: SaliencyMethod) -> Result<Self> {
        let (width, height) = original.dimensions();
        Ok(Self {
            original_png: encode_png(original)?,
            overlay_png: encode_png(overlay)?,
            width,
            height,
            method: Some(method),
        })
    }

    /// The original image as both outputs.
    pub fn passthrough(original: &RgbImage) -> Result<Self> {
        let (width, height) = original.dimensions();
        let png = encode_png(original)?;
        Ok(Self {
            original_png: png.clone(),
            overlay_png: png,
            width,
            height,
            method: None,
        })
    }

    /// Whether the overlay is just the original image.
    pub fn is_passthrough(&self) -> bool {
        self.method.is_none()
    }

    /// Original image as a data URI.
    pub fn original_data_uri(&self) -> String {
        to_data_uri(&self.original_png)
    }

    /// Overlay image as a data URI.
    pub fn overlay_data_uri(&self) -> String {
        to_data_uri(&self.overlay_png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encode_png_decodes_back() {
        let img = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8, y as u8, 9]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(to_data_uri(b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_passthrough_artifact() {
        let img = RgbImage::from_pixel(6, 4, Rgb([1, 2, 3]));
        let artifact = VisualizationArtifact::passthrough(&img).unwrap();
        assert!(artifact.is_passthrough());
        assert_eq!(artifact.original_png, artifact.overlay_png);
        assert_eq!((artifact.width, artifact.height), (6, 4));
        assert!(artifact.overlay_data_uri().starts_with(PNG_DATA_URI_PREFIX));
    }
}
