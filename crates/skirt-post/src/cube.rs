//! Spectral-cube loading and wavelength-band integration.

use std::path::Path;

use ndarray::{Array2, Array3};

use crate::error::PostError;
use crate::fits::{self, FitsFile, Hdu};

/// A 3-D surface-brightness cube with its wavelength grid in micron.
#[derive(Debug, Clone)]
pub struct SpectralCube {
    /// Shape (nlam, ny, nx)
    pub data: Array3<f64>,
    /// One wavelength per plane, micron
    pub wavelengths: Vec<f64>,
}

/// Primary HDU contents: a plain 2-D image or a full cube.
#[derive(Debug, Clone)]
pub enum LoadedImage {
    Plane(Array2<f64>),
    Cube(SpectralCube),
}

/// Loads the primary HDU of a SKIRT output file.
///
/// 2-D data comes back as a plane; 3-D data as a cube with its wavelength
/// grid taken from the first extension, falling back to the CRVAL3 / CDELT3 /
/// CRPIX3 header keywords. Any other dimensionality is an error.
pub fn load(path: &Path) -> Result<LoadedImage, PostError> {
    let file = fits::read_file(path)?;
    match file.primary.shape.len() {
        2 => {
            let (ny, nx) = (file.primary.shape[0], file.primary.shape[1]);
            let plane = Array2::from_shape_vec((ny, nx), file.primary.data)
                .expect("shape matches data length");
            Ok(LoadedImage::Plane(plane))
        }
        3 => Ok(LoadedImage::Cube(load_cube_from(file))),
        _ => Err(PostError::NotACube {
            path: path.to_path_buf(),
            shape: file.primary.shape,
        }),
    }
}

/// Loads the primary HDU and requires it to be a 3-D cube.
pub fn load_cube(path: &Path) -> Result<SpectralCube, PostError> {
    let file = fits::read_file(path)?;
    if file.primary.shape.len() != 3 {
        return Err(PostError::NotACube {
            path: path.to_path_buf(),
            shape: file.primary.shape,
        });
    }
    Ok(load_cube_from(file))
}

fn load_cube_from(file: FitsFile) -> SpectralCube {
    let shape = (
        file.primary.shape[0],
        file.primary.shape[1],
        file.primary.shape[2],
    );
    let wavelengths = wavelength_grid(&file.primary, file.extensions.first(), shape.0);
    let data = Array3::from_shape_vec(shape, file.primary.data).expect("shape matches data length");
    SpectralCube { data, wavelengths }
}

/// Wavelength grid from the extension HDU, or from the WCS keywords of the
/// primary header when no extension is present.
fn wavelength_grid(primary: &Hdu, extension: Option<&Hdu>, nlam: usize) -> Vec<f64> {
    if let Some(ext) = extension {
        if !ext.data.is_empty() {
            return ext.data.clone();
        }
    }
    let crval = primary.header.real("CRVAL3").unwrap_or(0.0);
    let cdelt = primary.header.real("CDELT3").unwrap_or(1.0);
    let crpix = primary.header.real("CRPIX3").unwrap_or(1.0);
    (0..nlam)
        .map(|i| crval + (i as f64 + 1.0 - crpix) * cdelt)
        .collect()
}

impl SpectralCube {
    /// Sums the planes whose wavelength falls in `[wmin, wmax]`, treating
    /// NaN pixels as zero. An empty selection is an error.
    pub fn band_image(&self, wmin: f64, wmax: f64, path: &Path) -> Result<Array2<f64>, PostError> {
        let selected: Vec<usize> = self
            .wavelengths
            .iter()
            .enumerate()
            .filter(|(_, &w)| w >= wmin && w <= wmax)
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(PostError::EmptyBand {
                path: path.to_path_buf(),
                wmin,
                wmax,
            });
        }
        Ok(self.sum_planes(&selected))
    }

    /// Sums every plane, treating NaN pixels as zero.
    pub fn collapse(&self) -> Array2<f64> {
        let all: Vec<usize> = (0..self.data.shape()[0]).collect();
        self.sum_planes(&all)
    }

    /// Smallest and largest wavelength on the grid.
    pub fn wavelength_range(&self) -> (f64, f64) {
        let min = self.wavelengths.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self
            .wavelengths
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }

    fn sum_planes(&self, planes: &[usize]) -> Array2<f64> {
        let (_, ny, nx) = self.data.dim();
        let mut out = Array2::zeros((ny, nx));
        for &p in planes {
            for y in 0..ny {
                for x in 0..nx {
                    let v = self.data[[p, y, x]];
                    if v.is_finite() {
                        out[[y, x]] += v;
                    }
                }
            }
        }
        out
    }
}
