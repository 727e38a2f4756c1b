//! Run metadata sidecar (`meta.json`).
//!
//! The extractor records every unit-conversion factor, dataset-key choice,
//! fallback note, and particle count it used, so downstream stages (the .ski
//! builder in particular) and humans can reconstruct how the tables were
//! produced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::DataError;

/// Scalar header attributes read from the first snapshot chunk.
///
/// Only the attributes the pipeline consumes are captured; `present` lists
/// which of them the file actually carried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redshift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omega0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omega_lambda: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hubble_param: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_length_in_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_mass_in_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_time_in_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_files_per_snapshot: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub present: Vec<String>,
}

/// Particle counts before and after the radial cutoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleCounts {
    pub stars_total: u64,
    pub stars_kept: u64,
    pub gas_total: u64,
    pub gas_kept: u64,
}

/// Everything the extractor knows about one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub snapshot_glob: String,
    pub snapshot_files: Vec<String>,
    pub host_coords: String,
    pub snapnum: u32,
    pub r_cut_kpc: f64,
    pub dust_to_metals: f64,
    pub pos_to_kpc: f64,
    pub host_pos_to_kpc: f64,
    pub hsml_fallback_kpc: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_to_msun_arg: Option<f64>,
    pub mass_to_msun_used: f64,
    pub metallicity_scale: f64,
    pub metallicity_column_used: usize,

    /// Conversion factors derived from the snapshot header, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_to_kpc_from_header: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_to_msun_from_header: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_to_kpc_hint_from_hubble: Option<f64>,

    /// Provenance of the host-galaxy position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_position_dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_index_dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_position_raw: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_position_kpc: Option<[f64; 3]>,

    /// Which HDF5 dataset satisfied each quantity, per species.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub star_keys_used: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gas_keys_used: BTreeMap<String, String>,

    /// Free-form fallback notes, keyed by topic (age, hsml, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_now_gyr: Option<f64>,

    pub header_attrs: HeaderAttrs,
    pub counts: ParticleCounts,
    pub created_utc: String,
}

impl RunMetadata {
    /// Loads metadata from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| DataError::json(path, e))
    }

    /// Writes the metadata as pretty-printed JSON.
    pub fn to_file(&self, path: &Path) -> Result<(), DataError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| DataError::json(path, e))?;
        fs::write(path, content).map_err(|e| DataError::io(path, e))
    }

    /// Records a fallback note under a topic key, overwriting earlier notes
    /// on the same topic.
    pub fn note(&mut self, topic: &str, text: impl Into<String>) {
        self.notes.insert(topic.to_string(), text.into());
    }
}
