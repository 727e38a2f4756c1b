//! Colormapping, resizing, and raster output.

use std::path::Path;

use clap::ValueEnum;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::PostError;

/// Output raster format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpg,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
        }
    }
}

/// Resampling filter used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    Lanczos,
    Bilinear,
    Bicubic,
    Nearest,
}

impl ResampleFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResampleFilter::Lanczos => FilterType::Lanczos3,
            ResampleFilter::Bilinear => FilterType::Triangle,
            ResampleFilter::Bicubic => FilterType::CatmullRom,
            ResampleFilter::Nearest => FilterType::Nearest,
        }
    }
}

/// Looks up a colormap by name.
pub fn colormap(name: &str) -> Result<colorous::Gradient, PostError> {
    match name {
        "magma" => Ok(colorous::MAGMA),
        "inferno" => Ok(colorous::INFERNO),
        "plasma" => Ok(colorous::PLASMA),
        "viridis" => Ok(colorous::VIRIDIS),
        "turbo" => Ok(colorous::TURBO),
        "cividis" => Ok(colorous::CIVIDIS),
        other => Err(PostError::UnknownColormap {
            name: other.to_string(),
        }),
    }
}

/// Maps scaled pixel values through a colormap into an RGBA image.
///
/// Values are normalized to [0, 1] over [vmin, vmax] with clipping; a
/// degenerate range maps everything to the low end.
pub fn colorize(img: &Array2<f64>, vmin: f64, vmax: f64, gradient: &colorous::Gradient) -> RgbaImage {
    let (ny, nx) = img.dim();
    let span = vmax - vmin;
    let mut out = RgbaImage::new(nx as u32, ny as u32);
    for y in 0..ny {
        for x in 0..nx {
            let t = if span > 0.0 {
                ((img[[y, x]] - vmin) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let c = gradient.eval_continuous(t);
            out.put_pixel(x as u32, y as u32, Rgba([c.r, c.g, c.b, 255]));
        }
    }
    out
}

/// Resizes to a square of `size` pixels per side.
pub fn resize(img: &RgbaImage, size: u32, filter: ResampleFilter) -> RgbaImage {
    image::imageops::resize(img, size, size, filter.filter_type())
}

/// Writes the image in the requested format. JPEG drops the alpha channel.
pub fn save(img: RgbaImage, path: &Path, format: OutputFormat) -> Result<(), PostError> {
    let result = match format {
        OutputFormat::Png => DynamicImage::ImageRgba8(img).save(path),
        OutputFormat::Jpg => DynamicImage::ImageRgba8(img).to_rgb8().save(path),
    };
    result.map_err(|e| PostError::Encode {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_known_colormaps_resolve() {
        for name in ["magma", "inferno", "plasma", "viridis", "turbo", "cividis"] {
            assert!(colormap(name).is_ok());
        }
    }

    #[test]
    fn test_unknown_colormap_is_error() {
        assert!(matches!(
            colormap("rainbow").unwrap_err(),
            PostError::UnknownColormap { .. }
        ));
    }

    #[test]
    fn test_colorize_clips_to_range() {
        let img = array![[-1.0, 0.0], [0.5, 2.0]];
        let gradient = colormap("viridis").unwrap();
        let rgba = colorize(&img, 0.0, 1.0, &gradient);
        assert_eq!(rgba.dimensions(), (2, 2));
        // Below vmin and at vmin map to the same color.
        assert_eq!(rgba.get_pixel(0, 0), rgba.get_pixel(1, 0));
        // Above vmax maps to the top color.
        let top = gradient.eval_continuous(1.0);
        assert_eq!(rgba.get_pixel(1, 1).0[0], top.r);
    }

    #[test]
    fn test_degenerate_range_maps_low() {
        let img = array![[3.0, 3.0]];
        let gradient = colormap("magma").unwrap();
        let rgba = colorize(&img, 3.0, 3.0, &gradient);
        let low = gradient.eval_continuous(0.0);
        assert_eq!(rgba.get_pixel(0, 0).0[0], low.r);
    }

    #[test]
    fn test_resize_changes_dimensions() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let out = resize(&img, 8, ResampleFilter::Nearest);
        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_save_png_and_jpg() {
        let dir = tempdir().unwrap();
        let img = RgbaImage::from_pixel(2, 2, Rgba([100, 150, 200, 255]));

        let png = dir.path().join("out.png");
        save(img.clone(), &png, OutputFormat::Png).unwrap();
        assert!(png.exists());

        let jpg = dir.path().join("out.jpg");
        save(img, &jpg, OutputFormat::Jpg).unwrap();
        assert!(jpg.exists());
    }
}
