//! Mask-weighted compositing of colorized saliency onto the source image.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::colorize::{colorize, threshold};
use crate::config::ExplainConfig;
use crate::error::{ExplainError, Result};
use crate::map::ImportanceMap;
use crate::strategy::Saliency;

/// Blend `colorized` onto `original`, weighted per pixel by `mask x alpha`.
///
/// `out = orig x (1 - m x alpha) + color x (m x alpha)`, rounded and clipped.
/// Pixels whose mask value is zero are copied unchanged.
///
/// # Errors
///
/// Returns [`ExplainError::Resample`] if `colorized` or `mask` does not match
/// the dimensions of `original`.
pub fn blend(
    original: &RgbImage,
    colorized: &RgbImage,
    mask: &ImportanceMap,
    alpha: f32,
) -> Result<RgbImage> {
    let (w, h) = original.dimensions();
    let target = [h as usize, w as usize];
    if mask.shape() != target {
        return Err(ExplainError::Resample {
            from: mask.shape(),
            to: target,
        });
    }
    if colorized.dimensions() != (w, h) {
        let (cw, ch) = colorized.dimensions();
        return Err(ExplainError::Resample {
            from: [ch as usize, cw as usize],
            to: target,
        });
    }

    let mut out = original.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let m = mask.get(y as usize, x as usize);
        if m.is_nan() || m <= 0.0 {
            continue;
        }
        let a = (m * alpha).clamp(0.0, 1.0);
        let Rgb(color) = *colorized.get_pixel(x, y);
        for (channel, c) in pixel.0.iter_mut().zip(color) {
            let v = *channel as f32 * (1.0 - a) + c as f32 * a;
            *channel = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// [`blend`], recovering from misaligned inputs.
///
/// On a dimension mismatch the mask is resampled bilinearly and the
/// colorized image by nearest neighbour to the exact size of `original`, and
/// the blend is retried. If that also fails the original is returned.
pub fn overlay(
    original: &RgbImage,
    colorized: &RgbImage,
    mask: &ImportanceMap,
    alpha: f32,
) -> RgbImage {
    match blend(original, colorized, mask, alpha) {
        Ok(out) => out,
        Err(e) => {
            tracing::debug!(error = %e, "realigning overlay inputs");
            let (w, h) = original.dimensions();
            let retried = mask.resample(w, h).and_then(|mask| {
                let colorized = imageops::resize(colorized, w, h, FilterType::Nearest);
                blend(original, &colorized, &mask, alpha)
            });
            retried.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "overlay failed, keeping original");
                original.clone()
            })
        }
    }
}

/// Intermediate and final images of one rendering.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Thresholded mask at the original resolution.
    pub mask: ImportanceMap,
    /// Verdict colorization at the original resolution.
    pub colorized: RgbImage,
    /// Final composite.
    pub overlay: RgbImage,
}

/// Threshold, align, colorize and composite a saliency map onto `original`.
///
/// The map is thresholded at its native resolution, resampled to the image
/// size, and colorized from the resampled values.
///
/// # Errors
///
/// Returns [`ExplainError::Resample`] if the map or the image is empty.
pub fn render(
    original: &RgbImage,
    saliency: &Saliency,
    is_fake: bool,
    config: &ExplainConfig,
) -> Result<Rendered> {
    let (w, h) = original.dimensions();
    let mask = threshold(&saliency.map, config.threshold_percentile).resample(w, h)?;
    let colorized = colorize(&mask, is_fake, &config.bands);
    let overlay = overlay(original, &colorized, &mask, saliency.alpha);
    Ok(Rendered {
        mask,
        colorized,
        overlay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorize::{RED, YELLOW};
    use crate::config::SaliencyMethod;
    use ndarray::{array, Array2};

    fn gray(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([100, 100, 100]))
    }

    #[test]
    fn test_blend_formula() {
        let original = gray(2, 1);
        let colorized = RgbImage::from_pixel(2, 1, RED);
        let mask = ImportanceMap::new(array![[1.0, 0.5]]);

        let out = blend(&original, &colorized, &mask, 0.5).unwrap();
        // a = 0.5: 100 * 0.5 + 255 * 0.5 = 177.5
        assert_eq!(*out.get_pixel(0, 0), Rgb([178, 50, 50]));
        // a = 0.25: 100 * 0.75 + 255 * 0.25 = 138.75
        assert_eq!(*out.get_pixel(1, 0), Rgb([139, 75, 75]));
    }

    #[test]
    fn test_blend_zero_mask_untouched() {
        let original = RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8 * 40, y as u8 * 40, 7]));
        let colorized = RgbImage::from_pixel(4, 4, YELLOW);
        let mut values = Array2::zeros((4, 4));
        values[[1, 2]] = 1.0;

        let out = blend(&original, &colorized, &ImportanceMap::new(values), 0.5).unwrap();
        for (x, y, p) in out.enumerate_pixels() {
            if (x, y) != (2, 1) {
                assert_eq!(p, original.get_pixel(x, y));
            }
        }
        assert_ne!(out.get_pixel(2, 1), original.get_pixel(2, 1));
    }

    #[test]
    fn test_blend_mismatch_is_resample_error() {
        let original = gray(4, 4);
        let colorized = RgbImage::new(4, 4);
        let mask = ImportanceMap::zeros(2, 2);
        assert!(matches!(
            blend(&original, &colorized, &mask, 0.5),
            Err(ExplainError::Resample { .. })
        ));
    }

    #[test]
    fn test_overlay_realigns() {
        let original = gray(8, 8);
        let colorized = RgbImage::from_pixel(4, 4, RED);
        let mask = ImportanceMap::filled(4, 4, 0.5);

        let out = overlay(&original, &colorized, &mask, 0.5);
        assert_eq!(out.dimensions(), (8, 8));
        assert!(out.pixels().all(|p| *p == Rgb([139, 75, 75])));
    }

    #[test]
    fn test_overlay_unrecoverable_returns_original() {
        let original = gray(3, 3);
        let out = overlay(&original, &RgbImage::new(1, 1), &ImportanceMap::zeros(0, 0), 0.5);
        assert_eq!(out, original);
    }

    #[test]
    fn test_render_zero_map_keeps_original() {
        let original = RgbImage::from_fn(10, 6, |x, y| Rgb([x as u8, y as u8, 200]));
        let saliency = Saliency {
            map: ImportanceMap::zeros(3, 3),
            method: SaliencyMethod::GradCam,
            alpha: 0.5,
        };
        let rendered = render(&original, &saliency, true, &ExplainConfig::default()).unwrap();
        assert_eq!(rendered.overlay, original);
        assert!(rendered.colorized.pixels().all(|p| p.0 == [0, 0, 0]));
        assert_eq!(rendered.mask.shape(), [6, 10]);
    }

    #[test]
    fn test_render_dimensions_follow_original() {
        let original = gray(37, 23);
        let saliency = Saliency {
            map: ImportanceMap::new(array![[0.0, 0.2], [0.6, 1.0]]),
            method: SaliencyMethod::GradCam,
            alpha: 0.5,
        };
        let rendered = render(&original, &saliency, false, &ExplainConfig::default()).unwrap();
        assert_eq!(rendered.overlay.dimensions(), (37, 23));
        assert_eq!(rendered.colorized.dimensions(), (37, 23));
    }
}
