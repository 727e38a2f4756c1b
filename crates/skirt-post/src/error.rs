//! Error type for the post-processing stages.

use std::path::PathBuf;
use thiserror::Error;

/// Any failure that aborts a post-processing stage.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fits(#[from] crate::fits::FitsError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no FITS files found for pattern: {pattern}")]
    NoInputs { pattern: String },

    #[error("no wavelengths in range {wmin}-{wmax} micron in {path}")]
    EmptyBand {
        path: PathBuf,
        wmin: f64,
        wmax: f64,
    },

    #[error("expected a 3-D cube in {path}, got shape {shape:?}")]
    NotACube { path: PathBuf, shape: Vec<usize> },

    #[error("no positive values for log scaling in {path}")]
    NoPositiveValues { path: PathBuf },

    #[error("no finite values in image {path}")]
    NoFiniteValues { path: PathBuf },

    #[error("crop fraction must be in (0, 1], got {frac}")]
    BadCropFraction { frac: f64 },

    #[error("unknown colormap: {name}")]
    UnknownColormap { name: String },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl PostError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PostError::Io {
            path: path.into(),
            source,
        }
    }
}
