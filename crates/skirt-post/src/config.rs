//! Post-processing defaults loaded from a TOML file.
//!
//! The same config file serves both binaries: `skirt_post` reads the
//! `[frames]` and `[rgb]` sections and ignores the preparation-side
//! `[extract]` and `[ski]` sections. Every field has a default, so a partial
//! file (or no file at all) is valid; CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PostError;
use crate::render::{OutputFormat, ResampleFilter};
use crate::rgb::BandPreset;
use crate::stretch::StretchMode;

/// Post-processing configuration: `[frames]` and `[rgb]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub rgb: RgbConfig,
}

impl PostConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PostError> {
        let content = std::fs::read_to_string(path).map_err(|e| PostError::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| PostError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the given file, or returns defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PostError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

/// Frame-rendering defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Directory holding the SKIRT output FITS files
    pub input_dir: String,
    /// Glob matched inside the input directory
    pub pattern: String,
    /// Output directory; defaults to `<input_dir>/images`
    pub out_dir: Option<String>,
    /// Output raster format
    pub format: OutputFormat,
    /// Intensity stretch applied before colormapping
    pub stretch_mode: StretchMode,
    /// Asinh softening parameter
    pub q: f64,
    /// Asinh stretch scale
    pub stretch: f64,
    /// Lower display percentile
    pub pmin: f64,
    /// Upper display percentile
    pub pmax: f64,
    /// Colormap name
    pub cmap: String,
    /// Gaussian FWHM in pixels; 0 disables smoothing
    pub fwhm_pix: f64,
    /// Center-crop fraction; 1 keeps the full frame
    pub crop_frac: f64,
    /// Output side length in pixels; None keeps the native size
    pub size_px: Option<u32>,
    /// Resampling filter used when resizing
    pub resample: ResampleFilter,
    /// Replace exact-zero pixels with a low-percentile floor
    pub zero_fill: bool,
    /// Percentile of the positive pixels used as the zero-fill floor
    pub zero_percentile: f64,
    /// Band lower bound, micron; None integrates from the grid minimum
    pub wmin: Option<f64>,
    /// Band upper bound, micron; None integrates to the grid maximum
    pub wmax: Option<f64>,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            input_dir: "run".to_string(),
            pattern: "*view_*_total.fits".to_string(),
            out_dir: None,
            format: OutputFormat::Png,
            stretch_mode: StretchMode::Asinh,
            q: 5.0,
            stretch: 0.4,
            pmin: 1.0,
            pmax: 99.0,
            cmap: "magma".to_string(),
            fwhm_pix: 4.0,
            crop_frac: 1.0,
            size_px: None,
            resample: ResampleFilter::Lanczos,
            zero_fill: false,
            zero_percentile: 1.0,
            wmin: None,
            wmax: None,
        }
    }
}

/// False-color composite defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbConfig {
    /// Directory holding the SKIRT output FITS files
    pub input_dir: String,
    /// Glob matched inside the input directory
    pub pattern: String,
    /// Output directory; defaults to `<input_dir>/rgb`
    pub out_dir: Option<String>,
    /// Instrument band preset
    pub preset: BandPreset,
    /// Blue band override, micron
    pub band_b: Option<[f64; 2]>,
    /// Green band override, micron
    pub band_g: Option<[f64; 2]>,
    /// Red band override, micron
    pub band_r: Option<[f64; 2]>,
    /// Asinh softening parameter
    pub q: f64,
    /// Asinh stretch scale
    pub stretch: f64,
    /// Normalization percentile over finite channel values
    pub percentile: f64,
    /// File-name suffix; defaults to the preset name
    pub suffix: Option<String>,
}

impl Default for RgbConfig {
    fn default() -> Self {
        Self {
            input_dir: "run".to_string(),
            pattern: "*view_*_total.fits".to_string(),
            out_dir: None,
            preset: BandPreset::Hst,
            band_b: None,
            band_g: None,
            band_r: None,
            q: 10.0,
            stretch: 0.1,
            percentile: 99.5,
            suffix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let cfg = PostConfig::default();
        assert_eq!(cfg.frames.cmap, "magma");
        assert_eq!(cfg.frames.q, 5.0);
        assert_eq!(cfg.rgb.q, 10.0);
        assert_eq!(cfg.rgb.preset, BandPreset::Hst);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            "[frames]\ncmap = \"viridis\"\nfwhm_pix = 0.0\n\n[rgb]\npreset = \"jwst\"\n",
        )
        .unwrap();

        let cfg = PostConfig::from_file(&path).unwrap();
        assert_eq!(cfg.frames.cmap, "viridis");
        assert_eq!(cfg.frames.fwhm_pix, 0.0);
        assert_eq!(cfg.frames.pmax, 99.0);
        assert_eq!(cfg.rgb.preset, BandPreset::Jwst);
        assert_eq!(cfg.rgb.percentile, 99.5);
    }

    #[test]
    fn test_foreign_sections_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[extract]\nr_cut_kpc = 30.0\n").unwrap();

        let cfg = PostConfig::from_file(&path).unwrap();
        assert_eq!(cfg.frames.input_dir, "run");
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = PostConfig::from_file(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        assert!(matches!(err, PostError::ConfigIo { .. }));
    }
}
