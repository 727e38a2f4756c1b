//! Error type for the preparation stages.

use std::path::PathBuf;
use thiserror::Error;

/// Any failure that aborts a preparation stage.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Data(#[from] skirt_data::DataError),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

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

    #[error("no snapshot files found for glob: {pattern}")]
    NoSnapshots { pattern: String },

    #[error("required input missing: {path}")]
    MissingInput { path: PathBuf },

    #[error("no (N,3) or (3,N) position dataset found in host coordinates file {path}")]
    NoHostPosition { path: PathBuf },

    #[error(
        "could not locate snapshot {snapnum} in host file {path}; \
         add a snapshot index dataset or adjust --snapnum"
    )]
    HostIndexNotFound { path: PathBuf, snapnum: u32 },

    #[error("unhandled host position dataset shape {shape:?} in {path}")]
    HostPositionShape { path: PathBuf, shape: Vec<usize> },

    #[error("unsupported metallicity array shape {shape:?} in {dataset}")]
    MetallicityShape { dataset: String, shape: Vec<usize> },

    #[error("no views found in {path}; run `skirt_prep views` first")]
    NoViews { path: PathBuf },

    #[error("missing FITS images for {count} views (first: {first:?})")]
    MissingImages { count: usize, first: Vec<usize> },
}

impl PrepError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            path: path.into(),
            source,
        }
    }
}
