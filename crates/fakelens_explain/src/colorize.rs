//! Noise thresholding and verdict-specific colorization.

use image::{Rgb, RgbImage};

use crate::config::BandPolicy;
use crate::map::{percentile, ImportanceMap};

/// High-importance band color for fake verdicts.
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
/// Medium-importance band color for fake verdicts.
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
/// Uncolored pixel.
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Zero every value strictly below the `q`-th percentile and renormalize the
/// survivors by their max.
///
/// The result is all zero when nothing positive survives.
pub fn threshold(map: &ImportanceMap, q: f32) -> ImportanceMap {
    let cutoff = percentile(&map.to_vec(), q);
    let kept = map.values().mapv(|v| if v >= cutoff { v } else { 0.0 });
    ImportanceMap::new(kept).relu().normalize_max()
}

/// Red and yellow band thresholds for a map, after degenerate clamping.
///
/// Returns `None` when the map has no positive values.
pub fn band_thresholds(map: &ImportanceMap, policy: &BandPolicy) -> Option<(f32, f32)> {
    let positive: Vec<f32> = map.values().iter().copied().filter(|&v| v > 0.0).collect();
    if positive.is_empty() {
        return None;
    }
    let max = map.max();

    let mut high = percentile(&positive, policy.high_percentile);
    let mut medium = percentile(&positive, policy.medium_percentile);
    if high > policy.high_clamp_trigger * max {
        high = policy.high_clamp_ratio * max;
    }
    if medium > policy.medium_clamp_trigger * max {
        medium = policy.medium_clamp_ratio * max;
    }
    Some((high, medium))
}

/// Render a thresholded map with the policy for the verdict.
///
/// Fake verdicts get discrete red/yellow bands; real verdicts get a green
/// ramp. Zero-valued pixels stay black in both cases.
pub fn colorize(map: &ImportanceMap, is_fake: bool, policy: &BandPolicy) -> RgbImage {
    let [h, w] = map.shape();
    let mut out = RgbImage::new(w as u32, h as u32);

    if is_fake {
        let Some((high, medium)) = band_thresholds(map, policy) else {
            return out;
        };
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let v = map.get(y as usize, x as usize);
            if v <= 0.0 {
                continue;
            }
            if v >= high {
                *pixel = RED;
            } else if v >= medium {
                *pixel = YELLOW;
            }
        }
    } else {
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let v = map.get(y as usize, x as usize).clamp(0.0, 1.0);
            *pixel = Rgb([0, (v * 255.0) as u8, 0]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use proptest::prelude::*;

    #[test]
    fn test_threshold_keeps_top_values() {
        let map = ImportanceMap::new(array![[0.1, 0.2, 0.3, 0.4, 0.5]]);
        let out = threshold(&map, 70.0);
        // 70th percentile is 0.38
        assert_eq!(out.get(0, 2), 0.0);
        assert!((out.get(0, 3) - 0.8).abs() < 1e-6);
        assert!((out.get(0, 4) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_all_zero() {
        let out = threshold(&ImportanceMap::zeros(4, 4), 70.0);
        assert_eq!(out.count_positive(), 0);
    }

    #[test]
    fn test_band_thresholds_default() {
        let values: Vec<f32> = (1..=10).map(|v| v as f32 / 10.0).collect();
        let map = ImportanceMap::from_vec(1, 10, values).unwrap();
        let (high, medium) = band_thresholds(&map, &BandPolicy::default()).unwrap();
        assert!((high - 0.55).abs() < 1e-6);
        assert!((medium - 0.28).abs() < 1e-6);
    }

    #[test]
    fn test_band_thresholds_clamped_on_flat_map() {
        let map = ImportanceMap::filled(3, 3, 1.0);
        let (high, medium) = band_thresholds(&map, &BandPolicy::default()).unwrap();
        assert!((high - 0.6).abs() < 1e-6);
        assert!((medium - 0.3).abs() < 1e-6);

        let img = colorize(&map, true, &BandPolicy::default());
        assert!(img.pixels().all(|p| *p == RED));
    }

    #[test]
    fn test_colorize_fake_bands() {
        let map = ImportanceMap::new(array![[0.0, 0.1, 0.3], [0.5, 0.8, 1.0]]);
        let img = colorize(&map, true, &BandPolicy::default());
        assert_eq!(*img.get_pixel(0, 0), BLACK);
        assert_eq!(*img.get_pixel(2, 1), RED);
        assert_eq!(*img.get_pixel(1, 1), RED);
        assert_eq!(*img.get_pixel(2, 0), YELLOW);
        assert_eq!(*img.get_pixel(1, 0), BLACK);
    }

    #[test]
    fn test_colorize_real_green() {
        let map = ImportanceMap::new(array![[0.0, 0.5, 1.0]]);
        let img = colorize(&map, false, &BandPolicy::default());
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(1, 0), Rgb([0, 127, 0]));
        assert_eq!(*img.get_pixel(2, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_colorize_zero_map_is_black() {
        let map = ImportanceMap::zeros(5, 7);
        for is_fake in [true, false] {
            let img = colorize(&map, is_fake, &BandPolicy::default());
            assert_eq!(img.dimensions(), (7, 5));
            assert!(img.pixels().all(|p| *p == BLACK));
        }
    }

    fn map_strategy() -> impl Strategy<Value = ImportanceMap> {
        prop::collection::vec(0.0f32..1.0, 36)
            .prop_map(|v| ImportanceMap::new(Array2::from_shape_vec((6, 6), v).unwrap()))
    }

    proptest! {
        #[test]
        fn prop_threshold_monotone(map in map_strategy(), lo in 0.0f32..100.0, delta in 0.0f32..50.0) {
            let hi = (lo + delta).min(100.0);
            let loose = threshold(&map, lo).count_positive();
            let strict = threshold(&map, hi).count_positive();
            prop_assert!(strict <= loose);
        }

        #[test]
        fn prop_fake_palette(map in map_strategy()) {
            let img = colorize(&threshold(&map, 70.0), true, &BandPolicy::default());
            prop_assert!(img.pixels().all(|p| *p == RED || *p == YELLOW || *p == BLACK));
        }

        #[test]
        fn prop_real_palette(map in map_strategy()) {
            let img = colorize(&threshold(&map, 70.0), false, &BandPolicy::default());
            prop_assert!(img.pixels().all(|p| p[0] == 0 && p[2] == 0));
        }
    }
}
