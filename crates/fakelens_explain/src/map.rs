//! 2D importance maps.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::Array2;

use crate::error::{ExplainError, Result};

/// A 2D saliency map of shape `(height, width)`.
///
/// Maps produced by the saliency strategies are non-negative and normalized
/// to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array2<f32>,
}

impl ImportanceMap {
    /// Wrap an array of shape `(height, width)`.
    pub fn new(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Build a map from row-major data.
    pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        Ok(Self::new(Array2::from_shape_vec((height, width), data)?))
    }

    /// All-zero map.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self::new(Array2::zeros((height, width)))
    }

    /// Map filled with a constant.
    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self::new(Array2::from_elem((height, width), value))
    }

    /// The underlying values.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// `[height, width]`.
    pub fn shape(&self) -> [usize; 2] {
        let (h, w) = self.values.dim();
        [h, w]
    }

    /// Map height.
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Map width.
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Value at row `y`, column `x`.
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[[y, x]]
    }

    /// Maximum value, 0 for an empty map.
    pub fn max(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Minimum value, 0 for an empty map.
    pub fn min(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Number of strictly positive entries.
    pub fn count_positive(&self) -> usize {
        self.values.iter().filter(|&&v| v > 0.0).count()
    }

    /// Values in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }

    /// Clip negative (and NaN) values to zero.
    #[must_use]
    pub fn relu(self) -> Self {
        Self::new(self.values.mapv(|v| v.max(0.0)))
    }

    /// Divide by the maximum when it is positive, otherwise leave untouched.
    #[must_use]
    pub fn normalize_max(self) -> Self {
        let max = self.max();
        if max > 0.0 {
            Self::new(self.values.mapv(|v| v / max))
        } else {
            self
        }
    }

    /// Min-max normalize to [0, 1], guarding the range with `epsilon`.
    #[must_use]
    pub fn normalize_min_max(self, epsilon: f32) -> Self {
        let min = self.min();
        let range = self.max() - min;
        Self::new(self.values.mapv(|v| (v - min) / (range + epsilon)))
    }

    /// Bilinear resample to `width x height`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Resample`] if either shape is empty or the
    /// resampled buffer does not have the requested dimensions.
    pub fn resample(&self, width: u32, height: u32) -> Result<Self> {
        let [h, w] = self.shape();
        let resample_error = || ExplainError::Resample {
            from: [h, w],
            to: [height as usize, width as usize],
        };

        if h == 0 || w == 0 || width == 0 || height == 0 {
            return Err(resample_error());
        }
        if (w, h) == (width as usize, height as usize) {
            return Ok(self.clone());
        }

        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(w as u32, h as u32, self.to_vec()).ok_or_else(resample_error)?;
        let resized = imageops::resize(&buffer, width, height, FilterType::Triangle);
        if resized.dimensions() != (width, height) {
            return Err(resample_error());
        }

        Self::from_vec(height as usize, width as usize, resized.into_raw())
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in [0, 100]. Returns 0 for an empty slice.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
