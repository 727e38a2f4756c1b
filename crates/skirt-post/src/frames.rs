//! Batch rendering of SKIRT FITS output into colormapped raster frames.

use std::path::{Path, PathBuf};

use clap::Args;
use ndarray::Array2;
use tracing::info;

use crate::config::PostConfig;
use crate::cube::{self, LoadedImage};
use crate::error::PostError;
use crate::render::{self, OutputFormat, ResampleFilter};
use crate::smooth;
use crate::stretch::{self, StretchMode};

/// CLI flags for `skirt_post frames`. Unset flags fall back to the
/// `[frames]` config section.
#[derive(Debug, Args)]
pub struct FramesArgs {
    /// Directory holding the SKIRT output FITS files
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Glob matched inside the input directory
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Output directory (default: <input-dir>/images)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Output raster format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Intensity stretch applied before colormapping
    #[arg(long, value_enum)]
    pub stretch_mode: Option<StretchMode>,

    /// Asinh softening parameter
    #[arg(long)]
    pub q: Option<f64>,

    /// Asinh stretch scale
    #[arg(long)]
    pub stretch: Option<f64>,

    /// Lower display percentile
    #[arg(long)]
    pub pmin: Option<f64>,

    /// Upper display percentile
    #[arg(long)]
    pub pmax: Option<f64>,

    /// Colormap name
    #[arg(long)]
    pub cmap: Option<String>,

    /// Gaussian FWHM in pixels; 0 disables smoothing
    #[arg(long)]
    pub fwhm_pix: Option<f64>,

    /// Center-crop fraction; 1 keeps the full frame
    #[arg(long)]
    pub crop_frac: Option<f64>,

    /// Output side length in pixels
    #[arg(long)]
    pub size_px: Option<u32>,

    /// Resampling filter used when resizing
    #[arg(long, value_enum)]
    pub resample: Option<ResampleFilter>,

    /// Replace exact-zero pixels with a low-percentile floor
    #[arg(long)]
    pub zero_fill: bool,

    /// Percentile of the positive pixels used as the zero-fill floor
    #[arg(long)]
    pub zero_percentile: Option<f64>,

    /// Band lower bound, micron
    #[arg(long)]
    pub wmin: Option<f64>,

    /// Band upper bound, micron
    #[arg(long)]
    pub wmax: Option<f64>,
}

/// Fully resolved frame-rendering settings.
struct Settings {
    format: OutputFormat,
    stretch_mode: StretchMode,
    q: f64,
    stretch: f64,
    pmin: f64,
    pmax: f64,
    gradient: colorous::Gradient,
    fwhm_pix: f64,
    crop_frac: f64,
    size_px: Option<u32>,
    resample: ResampleFilter,
    zero_fill: bool,
    zero_percentile: f64,
    wmin: Option<f64>,
    wmax: Option<f64>,
}

/// Runs the frame stage over every matching FITS file.
pub fn run(args: &FramesArgs, config: &PostConfig) -> Result<(), PostError> {
    let cfg = &config.frames;
    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.input_dir));
    let pattern_name = args.pattern.clone().unwrap_or_else(|| cfg.pattern.clone());
    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| cfg.out_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| input_dir.join("images"));

    let cmap_name = args.cmap.clone().unwrap_or_else(|| cfg.cmap.clone());
    let settings = Settings {
        format: args.format.unwrap_or(cfg.format),
        stretch_mode: args.stretch_mode.unwrap_or(cfg.stretch_mode),
        q: args.q.unwrap_or(cfg.q),
        stretch: args.stretch.unwrap_or(cfg.stretch),
        pmin: args.pmin.unwrap_or(cfg.pmin),
        pmax: args.pmax.unwrap_or(cfg.pmax),
        gradient: render::colormap(&cmap_name)?,
        fwhm_pix: args.fwhm_pix.unwrap_or(cfg.fwhm_pix),
        crop_frac: args.crop_frac.unwrap_or(cfg.crop_frac),
        size_px: args.size_px.or(cfg.size_px),
        resample: args.resample.unwrap_or(cfg.resample),
        zero_fill: args.zero_fill || cfg.zero_fill,
        zero_percentile: args.zero_percentile.unwrap_or(cfg.zero_percentile),
        wmin: args.wmin.or(cfg.wmin),
        wmax: args.wmax.or(cfg.wmax),
    };

    let pattern = input_dir.join(&pattern_name).display().to_string();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    paths.sort();
    if paths.is_empty() {
        return Err(PostError::NoInputs { pattern });
    }
    std::fs::create_dir_all(&out_dir).map_err(|e| PostError::io(&out_dir, e))?;

    info!(files = paths.len(), "rendering frames");
    for path in &paths {
        let out_path = render_one(path, &out_dir, &settings)?;
        info!(path = %out_path.display(), "wrote frame");
    }
    Ok(())
}

/// Loads one file and reduces it to a single 2-D image.
fn reduce(path: &Path, settings: &Settings) -> Result<Array2<f64>, PostError> {
    match cube::load(path)? {
        LoadedImage::Plane(img) => Ok(img),
        LoadedImage::Cube(cube) => {
            if settings.wmin.is_some() || settings.wmax.is_some() {
                let (grid_min, grid_max) = cube.wavelength_range();
                let wmin = settings.wmin.unwrap_or(grid_min);
                let wmax = settings.wmax.unwrap_or(grid_max);
                cube.band_image(wmin, wmax, path)
            } else {
                Ok(cube.collapse())
            }
        }
    }
}

fn render_one(path: &Path, out_dir: &Path, settings: &Settings) -> Result<PathBuf, PostError> {
    let img = reduce(path, settings)?;
    let img = smooth::gaussian_smooth(&img, settings.fwhm_pix);
    let img = smooth::center_crop(&img, settings.crop_frac)?;
    let (scaled, vmin, vmax) = stretch::scale_image(
        img,
        settings.stretch_mode,
        settings.pmin,
        settings.pmax,
        settings.q,
        settings.stretch,
        settings.zero_fill,
        settings.zero_percentile,
        path,
    )?;

    let mut rgba = render::colorize(&scaled, vmin, vmax, &settings.gradient);
    if let Some(size) = settings.size_px {
        rgba = render::resize(&rgba, size, settings.resample);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let out_path = out_dir.join(format!("{stem}.{}", settings.format.extension()));
    render::save(rgba, &out_path, settings.format)?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::testutil::{image_extension, primary_cube};
    use tempfile::tempdir;

    fn default_settings() -> Settings {
        let cfg = crate::config::FramesConfig::default();
        Settings {
            format: cfg.format,
            stretch_mode: cfg.stretch_mode,
            q: cfg.q,
            stretch: cfg.stretch,
            pmin: cfg.pmin,
            pmax: cfg.pmax,
            gradient: render::colormap(&cfg.cmap).unwrap(),
            fwhm_pix: 0.0,
            crop_frac: cfg.crop_frac,
            size_px: None,
            resample: cfg.resample,
            zero_fill: cfg.zero_fill,
            zero_percentile: cfg.zero_percentile,
            wmin: None,
            wmax: None,
        }
    }

    fn write_cube(dir: &Path, name: &str) -> PathBuf {
        let values: Vec<f64> = (0..18).map(|v| v as f64).collect();
        let mut bytes = primary_cube(2, 3, 3, &values);
        bytes.extend(image_extension(&[0.5, 1.5]));
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_reduce_collapses_without_band() {
        let dir = tempdir().unwrap();
        let path = write_cube(dir.path(), "cube.fits");
        let img = reduce(&path, &default_settings()).unwrap();
        assert_eq!(img.dim(), (3, 3));
        // Plane 0 pixel 0 is 0, plane 1 pixel 0 is 9.
        assert_eq!(img[[0, 0]], 9.0);
    }

    #[test]
    fn test_reduce_selects_band() {
        let dir = tempdir().unwrap();
        let path = write_cube(dir.path(), "cube.fits");
        let mut settings = default_settings();
        settings.wmin = Some(1.0);
        let img = reduce(&path, &settings).unwrap();
        // Only plane 1 (wavelength 1.5) is in range.
        assert_eq!(img[[0, 0]], 9.0);
        assert_eq!(img[[2, 2]], 17.0);
    }

    #[test]
    fn test_render_one_writes_png() {
        let dir = tempdir().unwrap();
        let path = write_cube(dir.path(), "snap_view_000_total.fits");
        let out_dir = dir.path().join("images");
        std::fs::create_dir_all(&out_dir).unwrap();

        let out = render_one(&path, &out_dir, &default_settings()).unwrap();
        assert_eq!(out, out_dir.join("snap_view_000_total.png"));
        assert!(out.exists());
    }

    #[test]
    fn test_render_one_resizes() {
        let dir = tempdir().unwrap();
        let path = write_cube(dir.path(), "cube.fits");
        let out_dir = dir.path().to_path_buf();
        let mut settings = default_settings();
        settings.size_px = Some(16);

        let out = render_one(&path, &out_dir, &settings).unwrap();
        let img = image::open(&out).unwrap();
        assert_eq!(img.width(), 16);
        assert_eq!(img.height(), 16);
    }

    #[test]
    fn test_run_requires_inputs() {
        let dir = tempdir().unwrap();
        let args = FramesArgs {
            input_dir: Some(dir.path().to_path_buf()),
            pattern: None,
            out_dir: None,
            format: None,
            stretch_mode: None,
            q: None,
            stretch: None,
            pmin: None,
            pmax: None,
            cmap: None,
            fwhm_pix: None,
            crop_frac: None,
            size_px: None,
            resample: None,
            zero_fill: false,
            zero_percentile: None,
            wmin: None,
            wmax: None,
        };
        let err = run(&args, &PostConfig::default()).unwrap_err();
        assert!(matches!(err, PostError::NoInputs { .. }));
    }
}
