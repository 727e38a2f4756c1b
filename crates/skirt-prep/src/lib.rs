//! SKIRT input preparation: everything upstream of the radiative-transfer run.
//!
//! Five batch stages, each a single pass from input files to output files:
//! `extract` (HDF5 snapshots to particle tables), `views` (Fibonacci sphere
//! camera directions), `ski` (SKIRT XML parameter file), `cameras`
//! (Cartesian camera report), and `check` (table statistics and output
//! verification).

pub mod check;
pub mod config;
pub mod cosmology;
pub mod error;
pub mod extract;
pub mod ski;
pub mod snapshot;
pub mod views;

pub use config::PrepConfig;
pub use error::PrepError;
