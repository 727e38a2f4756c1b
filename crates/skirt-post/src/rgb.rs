//! False-color RGB composites from SKIRT spectral cubes.
//!
//! Three wavelength bands are integrated out of each cube, combined with the
//! Lupton asinh scheme, normalized by a high percentile, and written as an
//! 8-bit PNG next to the frame output.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PostConfig;
use crate::cube;
use crate::error::PostError;
use crate::stretch::percentile;

/// Instrument band presets, wavelength ranges in micron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandPreset {
    Hst,
    Jwst,
}

/// Blue, green, and red wavelength ranges in micron.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub b: [f64; 2],
    pub g: [f64; 2],
    pub r: [f64; 2],
}

impl BandPreset {
    /// Band ranges for this preset.
    pub fn bands(self) -> Bands {
        match self {
            BandPreset::Hst => Bands {
                b: [0.41, 0.49],
                g: [0.54, 0.70],
                r: [0.75, 0.90],
            },
            BandPreset::Jwst => Bands {
                b: [1.00, 1.30],
                g: [1.80, 2.20],
                r: [3.20, 3.90],
            },
        }
    }

    /// Name used as the default file suffix.
    pub fn name(self) -> &'static str {
        match self {
            BandPreset::Hst => "hst",
            BandPreset::Jwst => "jwst",
        }
    }
}

/// CLI flags for `skirt_post rgb`. Unset flags fall back to the `[rgb]`
/// config section.
#[derive(Debug, Args)]
pub struct RgbArgs {
    /// Directory holding the SKIRT output FITS files
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Glob matched inside the input directory
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Output directory (default: <input-dir>/rgb)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Instrument band preset
    #[arg(long, value_enum)]
    pub preset: Option<BandPreset>,

    /// Blue band range in micron
    #[arg(long, num_args = 2, value_names = ["BMIN", "BMAX"])]
    pub band_b: Option<Vec<f64>>,

    /// Green band range in micron
    #[arg(long, num_args = 2, value_names = ["GMIN", "GMAX"])]
    pub band_g: Option<Vec<f64>>,

    /// Red band range in micron
    #[arg(long, num_args = 2, value_names = ["RMIN", "RMAX"])]
    pub band_r: Option<Vec<f64>>,

    /// Asinh softening parameter
    #[arg(long)]
    pub q: Option<f64>,

    /// Asinh stretch scale
    #[arg(long)]
    pub stretch: Option<f64>,

    /// Normalization percentile over finite channel values
    #[arg(long)]
    pub percentile: Option<f64>,

    /// File-name suffix (default: the preset name)
    #[arg(long)]
    pub suffix: Option<String>,
}

/// Three float channels of equal shape.
#[derive(Debug, Clone)]
pub struct RgbChannels {
    pub r: Array2<f64>,
    pub g: Array2<f64>,
    pub b: Array2<f64>,
}

/// Lupton's asinh color-preserving composition.
///
/// Negative inputs are clamped, the mean intensity is floored at 1e-12, and
/// each channel is scaled by asinh(q I / stretch) / (q I).
pub fn lupton_rgb(
    r: &Array2<f64>,
    g: &Array2<f64>,
    b: &Array2<f64>,
    q: f64,
    stretch: f64,
) -> RgbChannels {
    let dim = r.dim();
    let mut out = RgbChannels {
        r: Array2::zeros(dim),
        g: Array2::zeros(dim),
        b: Array2::zeros(dim),
    };
    for y in 0..dim.0 {
        for x in 0..dim.1 {
            let rv = r[[y, x]].max(0.0);
            let gv = g[[y, x]].max(0.0);
            let bv = b[[y, x]].max(0.0);
            let intensity = ((rv + gv + bv) / 3.0).max(1e-12);
            let f = (q * (intensity / stretch)).asinh() / q;
            out.r[[y, x]] = (f * rv / intensity).max(0.0);
            out.g[[y, x]] = (f * gv / intensity).max(0.0);
            out.b[[y, x]] = (f * bv / intensity).max(0.0);
        }
    }
    out
}

/// Normalizes all three channels by the given percentile of the finite
/// values and clamps to [0, 1].
pub fn normalize(channels: &mut RgbChannels, p: f64) {
    let vals: Vec<f64> = channels
        .r
        .iter()
        .chain(channels.g.iter())
        .chain(channels.b.iter())
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if !vals.is_empty() {
        let vmax = percentile(&vals, p);
        if vmax > 0.0 {
            for ch in [&mut channels.r, &mut channels.g, &mut channels.b] {
                for v in ch.iter_mut() {
                    *v /= vmax;
                }
            }
        }
    }
    for ch in [&mut channels.r, &mut channels.g, &mut channels.b] {
        for v in ch.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
    }
}

/// Quantizes normalized channels to an 8-bit RGB image.
pub fn to_image(channels: &RgbChannels) -> RgbImage {
    let (ny, nx) = channels.r.dim();
    let mut img = RgbImage::new(nx as u32, ny as u32);
    for y in 0..ny {
        for x in 0..nx {
            let px = Rgb([
                (channels.r[[y, x]] * 255.0) as u8,
                (channels.g[[y, x]] * 255.0) as u8,
                (channels.b[[y, x]] * 255.0) as u8,
            ]);
            img.put_pixel(x as u32, y as u32, px);
        }
    }
    img
}

fn override_band(base: [f64; 2], flag: &Option<Vec<f64>>) -> [f64; 2] {
    match flag {
        Some(v) if v.len() == 2 => [v[0], v[1]],
        _ => base,
    }
}

/// Runs the composite stage over every matching cube.
pub fn run(args: &RgbArgs, config: &PostConfig) -> Result<(), PostError> {
    let cfg = &config.rgb;
    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.input_dir));
    let pattern_name = args.pattern.clone().unwrap_or_else(|| cfg.pattern.clone());
    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| cfg.out_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| input_dir.join("rgb"));
    let preset = args.preset.unwrap_or(cfg.preset);
    let q = args.q.unwrap_or(cfg.q);
    let stretch = args.stretch.unwrap_or(cfg.stretch);
    let p = args.percentile.unwrap_or(cfg.percentile);
    let suffix = args
        .suffix
        .clone()
        .or_else(|| cfg.suffix.clone())
        .unwrap_or_else(|| preset.name().to_string());

    let mut bands = preset.bands();
    bands.b = override_band(cfg.band_b.unwrap_or(bands.b), &args.band_b);
    bands.g = override_band(cfg.band_g.unwrap_or(bands.g), &args.band_g);
    bands.r = override_band(cfg.band_r.unwrap_or(bands.r), &args.band_r);

    let pattern = input_dir.join(&pattern_name).display().to_string();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    paths.sort();
    if paths.is_empty() {
        return Err(PostError::NoInputs { pattern });
    }
    std::fs::create_dir_all(&out_dir).map_err(|e| PostError::io(&out_dir, e))?;

    info!(files = paths.len(), preset = preset.name(), "composing RGB images");
    for path in &paths {
        let out_path = compose_one(path, &out_dir, &bands, q, stretch, p, &suffix)?;
        info!(path = %out_path.display(), "wrote composite");
    }
    Ok(())
}

fn compose_one(
    path: &Path,
    out_dir: &Path,
    bands: &Bands,
    q: f64,
    stretch: f64,
    p: f64,
    suffix: &str,
) -> Result<PathBuf, PostError> {
    let cube = cube::load_cube(path)?;
    let b = cube.band_image(bands.b[0], bands.b[1], path)?;
    let g = cube.band_image(bands.g[0], bands.g[1], path)?;
    let r = cube.band_image(bands.r[0], bands.r[1], path)?;

    let mut channels = lupton_rgb(&r, &g, &b, q, stretch);
    normalize(&mut channels, p);

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let out_path = out_dir.join(format!("{stem}_rgb_{suffix}.png"));
    let img = to_image(&channels);
    img.save(&out_path).map_err(|e| PostError::Encode {
        path: out_path.clone(),
        source: e,
    })?;
    Ok(out_path)
}
