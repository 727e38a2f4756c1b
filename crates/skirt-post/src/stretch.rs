//! Intensity scaling: sanitization, percentiles, and display stretches.

use std::path::Path;

use clap::ValueEnum;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::PostError;

/// Display stretch applied before percentile clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchMode {
    Linear,
    Log,
    Asinh,
}

/// Percentile with linear interpolation between order statistics
/// (rank = p/100 * (n-1)). NaN for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Replaces NaN and infinities with zero and clamps negatives to zero.
pub fn sanitize(img: &mut Array2<f64>) {
    for v in img.iter_mut() {
        if !v.is_finite() || *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// Replaces exact-zero pixels with the given percentile of the positive
/// pixels. No positives means no change.
pub fn replace_zeros(img: &mut Array2<f64>, p: f64) {
    let positives: Vec<f64> = img.iter().copied().filter(|&v| v > 0.0).collect();
    if positives.is_empty() {
        return;
    }
    let floor = percentile(&positives, p);
    for v in img.iter_mut() {
        if *v == 0.0 {
            *v = floor;
        }
    }
}

/// Applies the selected stretch in place.
///
/// Log clips below the 1st percentile of the positive pixels and fails when
/// there are none. Asinh computes arcsinh(q * x / stretch) / q.
pub fn apply_stretch(
    img: &mut Array2<f64>,
    mode: StretchMode,
    q: f64,
    stretch: f64,
    path: &Path,
) -> Result<(), PostError> {
    match mode {
        StretchMode::Linear => {}
        StretchMode::Log => {
            let positives: Vec<f64> = img.iter().copied().filter(|&v| v > 0.0).collect();
            if positives.is_empty() {
                return Err(PostError::NoPositiveValues {
                    path: path.to_path_buf(),
                });
            }
            let min_pos = percentile(&positives, 1.0);
            for v in img.iter_mut() {
                *v = v.max(min_pos).log10();
            }
        }
        StretchMode::Asinh => {
            for v in img.iter_mut() {
                *v = (q * (*v / stretch)).asinh() / q;
            }
        }
    }
    Ok(())
}

/// Full scaling pass: sanitize, optional zero fill, stretch, then the
/// [pmin, pmax] display range over the finite pixels.
#[allow(clippy::too_many_arguments)]
pub fn scale_image(
    mut img: Array2<f64>,
    mode: StretchMode,
    pmin: f64,
    pmax: f64,
    q: f64,
    stretch: f64,
    zero_fill: bool,
    zero_percentile: f64,
    path: &Path,
) -> Result<(Array2<f64>, f64, f64), PostError> {
    sanitize(&mut img);
    if zero_fill {
        replace_zeros(&mut img, zero_percentile);
    }
    apply_stretch(&mut img, mode, q, stretch, path)?;

    let vals: Vec<f64> = img.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.is_empty() {
        return Err(PostError::NoFiniteValues {
            path: path.to_path_buf(),
        });
    }
    let vmin = percentile(&vals, pmin);
    let vmax = percentile(&vals, pmax);
    Ok((img, vmin, vmax))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_percentile_interpolates() {
        let vals = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&vals, 0.0), 1.0);
        assert_eq!(percentile(&vals, 100.0), 4.0);
        assert_eq!(percentile(&vals, 50.0), 2.5);
        assert!((percentile(&vals, 25.0) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_empty_is_nan() {
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_sanitize_clears_bad_values() {
        let mut img = array![[f64::NAN, f64::INFINITY], [-1.0, 2.0]];
        sanitize(&mut img);
        assert_eq!(img, array![[0.0, 0.0], [0.0, 2.0]]);
    }

    #[test]
    fn test_replace_zeros_floors_at_percentile() {
        let mut img = array![[0.0, 1.0], [2.0, 3.0]];
        replace_zeros(&mut img, 0.0);
        assert_eq!(img[[0, 0]], 1.0);
        assert_eq!(img[[0, 1]], 1.0);
    }

    #[test]
    fn test_asinh_is_near_identity_for_small_values() {
        let mut img = array![[1e-8]];
        apply_stretch(&mut img, StretchMode::Asinh, 5.0, 0.4, Path::new("t")).unwrap();
        assert!((img[[0, 0]] - 1e-8 / 0.4).abs() < 1e-10);
    }

    #[test]
    fn test_log_clips_at_low_percentile() {
        let mut img = array![[0.0, 1.0], [10.0, 100.0]];
        apply_stretch(&mut img, StretchMode::Log, 5.0, 0.4, Path::new("t")).unwrap();
        // The zero pixel is floored at the 1st percentile of {1, 10, 100}.
        assert!(img[[0, 0]] >= 0.0);
        assert_eq!(img[[1, 1]], 2.0);
    }

    #[test]
    fn test_log_without_positives_is_error() {
        let mut img = array![[0.0, 0.0]];
        let err = apply_stretch(&mut img, StretchMode::Log, 5.0, 0.4, Path::new("t")).unwrap_err();
        assert!(matches!(err, PostError::NoPositiveValues { .. }));
    }

    #[test]
    fn test_scale_image_range() {
        let img = array![[0.0, 1.0], [2.0, 3.0]];
        let (scaled, vmin, vmax) = scale_image(
            img,
            StretchMode::Linear,
            0.0,
            100.0,
            5.0,
            0.4,
            false,
            1.0,
            Path::new("t"),
        )
        .unwrap();
        assert_eq!(vmin, 0.0);
        assert_eq!(vmax, 3.0);
        assert_eq!(scaled[[1, 1]], 3.0);
    }
}
