//! Shared file formats for the FIRE-to-SKIRT pipeline.
//!
//! This crate contains pure data structures and their (de)serialization:
//! whitespace-delimited particle tables, the camera view list, and the run
//! metadata sidecar. It has no pipeline logic and is a dependency for the
//! other crates in the workspace.

pub mod error;
pub mod meta;
pub mod table;
pub mod views;

pub use error::DataError;
pub use meta::{HeaderAttrs, ParticleCounts, RunMetadata};
pub use table::{Column, TableReader, TableWriter, GAS_COLUMNS, STAR_COLUMNS};
pub use views::{View, ViewSet};

/// Centimeters per kiloparsec.
pub const CM_PER_KPC: f64 = 3.085677581e21;

/// Kilometers per megaparsec.
pub const KM_PER_MPC: f64 = 3.085677581e19;

/// Grams per solar mass.
pub const G_PER_MSUN: f64 = 1.98847e33;

/// Seconds per gigayear.
pub const SEC_PER_GYR: f64 = 3.15576e16;
