//! Spatial Gaussian smoothing and center cropping.

use ndarray::Array2;

use crate::error::PostError;

const FWHM_TO_SIGMA: f64 = 2.355;

/// Smooths an image with a Gaussian of the given FWHM in pixels.
///
/// The kernel is separable and normalized; edges and non-finite pixels are
/// zero-filled. An FWHM of zero or less returns the input unchanged.
pub fn gaussian_smooth(img: &Array2<f64>, fwhm_pix: f64) -> Array2<f64> {
    if fwhm_pix <= 0.0 {
        return img.clone();
    }
    let mut img = img.clone();
    for v in img.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    let sigma = fwhm_pix / FWHM_TO_SIGMA;
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let (ny, nx) = img.dim();

    // Horizontal pass, then vertical.
    let mut tmp = Array2::zeros((ny, nx));
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let xi = x as isize + k as isize - radius as isize;
                if xi >= 0 && (xi as usize) < nx {
                    acc += w * img[[y, xi as usize]];
                }
            }
            tmp[[y, x]] = acc;
        }
    }
    let mut out = Array2::zeros((ny, nx));
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let yi = y as isize + k as isize - radius as isize;
                if yi >= 0 && (yi as usize) < ny {
                    acc += w * tmp[[yi as usize, x]];
                }
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Normalized 1-D Gaussian kernel truncated at four sigma.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma).ceil().max(1.0) as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in 0..=2 * radius {
        let d = i as f64 - radius as f64;
        kernel.push((-0.5 * (d / sigma).powi(2)).exp());
    }
    let total: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= total;
    }
    kernel
}

/// Keeps the central `frac` of each axis.
///
/// A fraction of one or more returns the input unchanged; zero or negative
/// is an error. The cropped size is at least one pixel per axis.
pub fn center_crop(img: &Array2<f64>, frac: f64) -> Result<Array2<f64>, PostError> {
    if frac >= 1.0 {
        return Ok(img.clone());
    }
    if frac <= 0.0 {
        return Err(PostError::BadCropFraction { frac });
    }
    let (ny, nx) = img.dim();
    let new_ny = ((ny as f64 * frac).round() as usize).max(1);
    let new_nx = ((nx as f64 * frac).round() as usize).max(1);
    let y0 = (ny - new_ny) / 2;
    let x0 = (nx - new_nx) / 2;

    let mut out = Array2::zeros((new_ny, new_nx));
    for y in 0..new_ny {
        for x in 0..new_nx {
            out[[y, x]] = img[[y0 + y, x0 + x]];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_fwhm_is_identity() {
        let img = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(gaussian_smooth(&img, 0.0), img);
    }

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = gaussian_kernel(1.7);
        let total: f64 = kernel.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(kernel.len() % 2, 1);
    }

    #[test]
    fn test_smoothing_preserves_interior_flux_scale() {
        // A flat field far from edges stays flat under a normalized kernel.
        let img = Array2::from_elem((41, 41), 2.5);
        let out = gaussian_smooth(&img, 3.0);
        assert!((out[[20, 20]] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_spreads_a_point() {
        let mut img = Array2::zeros((21, 21));
        img[[10, 10]] = 1.0;
        let out = gaussian_smooth(&img, 4.0);
        assert!(out[[10, 10]] < 1.0);
        assert!(out[[10, 11]] > 0.0);
        let total: f64 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_pixels_are_zero_filled_not_spread() {
        // A NaN hole in a flat field dents its neighborhood but must not
        // poison it: neighbors stay finite and close to the field level.
        let mut img = Array2::from_elem((41, 41), 1.0);
        img[[20, 20]] = f64::NAN;
        let out = gaussian_smooth(&img, 4.0);
        assert!(out[[20, 21]].is_finite());
        assert!(out[[20, 21]] > 0.5 && out[[20, 21]] < 1.0);
        assert!(out[[20, 20]].is_finite());
        // Outside the kernel footprint of the hole the field is untouched.
        assert!((out[[10, 10]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_crop_half() {
        let img = Array2::from_shape_fn((4, 4), |(y, x)| (y * 4 + x) as f64);
        let out = center_crop(&img, 0.5).unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert_eq!(out, array![[5.0, 6.0], [9.0, 10.0]]);
    }

    #[test]
    fn test_crop_full_is_identity() {
        let img = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(center_crop(&img, 1.0).unwrap(), img);
    }

    #[test]
    fn test_bad_fraction_is_error() {
        let img = array![[1.0]];
        assert!(matches!(
            center_crop(&img, 0.0).unwrap_err(),
            PostError::BadCropFraction { .. }
        ));
    }
}
