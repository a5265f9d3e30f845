//! Image preprocessing for vision classifiers.

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Configuration for [`ImageProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Square resolution the image is resized to.
    pub image_size: usize,
    /// Factor applied to raw `u8` values before normalization.
    pub rescale_factor: f32,
    /// Per-channel mean subtracted after rescaling.
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction.
    pub std: [f32; 3],
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            rescale_factor: 1.0 / 255.0,
            mean: [0.5; 3],
            std: [0.5; 3],
        }
    }
}

impl ProcessorConfig {
    /// Create a config for a given input resolution.
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            ..Default::default()
        }
    }
}

/// Decodes images and converts them to normalized `(1, 3, H, W)` tensors.
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    config: ProcessorConfig,
}

impl ImageProcessor {
    /// Create a new processor.
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Get the processor configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Decode encoded image bytes (PNG, JPEG) into an RGB bitmap.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a supported image or the image is empty.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(CoreError::InvalidImage(format!(
                "image has zero-sized dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(image)
    }

    /// Resize, rescale and normalize an image into a model input tensor.
    pub fn preprocess<B: Backend>(&self, image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
        let size = self.config.image_size;
        let resized = imageops::resize(image, size as u32, size as u32, FilterType::Triangle);

        // Channel-major layout: all R values, then G, then B
        let plane = size * size;
        let mut data = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 * self.config.rescale_factor;
                data[c * plane + i] = (value - self.config.mean[c]) / self.config.std[c];
            }
        }

        Tensor::from_data(TensorData::new(data, [1, 3, size, size]), device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    type TestBackend = NdArray;

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_processor_config_default() {
        let config = ProcessorConfig::default();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.mean, [0.5; 3]);
        assert_eq!(config.std, [0.5; 3]);
    }

    #[test]
    fn test_decode_png() {
        let image = RgbImage::from_pixel(7, 5, Rgb([10, 20, 30]));
        let processor = ImageProcessor::default();

        let decoded = processor.decode(&encode_png(&image)).unwrap();
        assert_eq!(decoded.dimensions(), (7, 5));
        assert_eq!(decoded.get_pixel(3, 2), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_garbage() {
        let processor = ImageProcessor::default();
        let result = processor.decode(b"definitely not an image");
        assert!(matches!(result, Err(CoreError::Decode(_))));
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let device = Default::default();
        let processor = ImageProcessor::new(ProcessorConfig::new(16));

        let image = RgbImage::from_pixel(40, 30, Rgb([255, 0, 128]));
        let pixels = processor.preprocess::<TestBackend>(&image, &device);
        assert_eq!(pixels.dims(), [1, 3, 16, 16]);

        let values = pixels.into_data().to_vec::<f32>().unwrap();
        // Red plane saturates to +1, green to -1
        assert!((values[0] - 1.0).abs() < 1e-5);
        assert!((values[256] + 1.0).abs() < 1e-5);
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
