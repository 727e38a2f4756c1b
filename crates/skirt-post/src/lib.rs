//! SKIRT output post-processing: FITS cubes to raster images.
//!
//! Two batch stages: `frames` renders single-band (or band-integrated)
//! colormapped PNG/JPEG frames, `rgb` combines three wavelength bands into
//! a Lupton-style false-color composite. Both walk a glob of FITS files and
//! process each one independently.

pub mod config;
pub mod cube;
pub mod error;
pub mod fits;
pub mod frames;
pub mod render;
pub mod rgb;
pub mod smooth;
pub mod stretch;

pub use config::PostConfig;
pub use error::PostError;
