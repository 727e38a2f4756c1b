//! Pipeline defaults loaded from a TOML file.
//!
//! All preparation settings can be supplied in a config file and overridden
//! per-invocation by CLI flags. Every field has a default, so a partial file
//! (or no file at all) is valid. The same file also carries the `[frames]`
//! and `[rgb]` sections consumed by `skirt_post`; unknown sections are
//! ignored here.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PrepError;
use crate::ski::SedFamily;

/// Preparation-side configuration: `[extract]` and `[ski]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepConfig {
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub ski: SkiConfig,
}

impl PrepConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PrepError> {
        let content = std::fs::read_to_string(path).map_err(|e| PrepError::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| PrepError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the given file, or returns defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PrepError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

/// Snapshot extraction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Glob matching the snapshot chunk files
    pub snapshot_glob: String,
    /// HDF5 file holding the host galaxy track
    pub host_coords: String,
    /// Output directory for tables and metadata
    pub out_dir: String,
    /// Radial cutoff around the host, kpc
    pub r_cut_kpc: f64,
    /// Dust-to-metals mass ratio passed through to the medium
    pub dust_to_metals: f64,
    /// Position unit conversion to kpc
    pub pos_to_kpc: f64,
    /// Constant smoothing length when none is available, kpc
    pub hsml_fallback_kpc: f64,
    /// Scale applied to metallicities after extraction
    pub metallicity_scale: f64,
    /// Column taken from 2-D metallicity arrays
    pub metallicity_column: usize,
    /// Snapshot number used to index the host track
    pub snapnum: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            snapshot_glob: "data/output/snapshot_600.*.hdf5".to_string(),
            host_coords: "data/track/host_coordinates.hdf5".to_string(),
            out_dir: "run".to_string(),
            r_cut_kpc: 60.0,
            dust_to_metals: 0.4,
            pos_to_kpc: 1.0,
            hsml_fallback_kpc: 0.5,
            metallicity_scale: 1.0,
            metallicity_column: 0,
            snapnum: 600,
        }
    }
}

/// Parameter-file defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiConfig {
    /// Output file name within the run directory
    pub ski_name: String,
    /// Photon packets per simulation
    pub num_packets: f64,
    /// Wavelength grid lower bound, micron
    pub min_wavelength: f64,
    /// Wavelength grid upper bound, micron
    pub max_wavelength: f64,
    /// Number of wavelength grid points
    pub num_wavelengths: u32,
    /// Instrument distance, Mpc
    pub distance_mpc: f64,
    /// Square pixel count per instrument
    pub pixels: u32,
    /// Spatial grid minimum refinement level
    pub min_level: u32,
    /// Spatial grid maximum refinement level
    pub max_level: u32,
    /// Cell subdivision threshold as a dust mass fraction
    pub max_dust_fraction: f64,
    /// Stellar SED family
    pub sed_family: SedFamily,
    /// Black-body source radius, km (BlackBody family only)
    pub bb_radius_km: f64,
    /// Black-body source temperature, K (BlackBody family only)
    pub bb_temp_k: f64,
}

impl Default for SkiConfig {
    fn default() -> Self {
        Self {
            ski_name: "m12i_600.ski".to_string(),
            num_packets: 2e5,
            min_wavelength: 0.09,
            max_wavelength: 100.0,
            num_wavelengths: 200,
            distance_mpc: 10.0,
            pixels: 256,
            min_level: 2,
            max_level: 6,
            max_dust_fraction: 1e-5,
            sed_family: SedFamily::BruzualCharlot,
            bb_radius_km: 6.96e5,
            bb_temp_k: 5000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let cfg = PrepConfig::default();
        assert_eq!(cfg.extract.r_cut_kpc, 60.0);
        assert_eq!(cfg.ski.pixels, 256);
        assert_eq!(cfg.ski.sed_family, SedFamily::BruzualCharlot);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            "[extract]\nr_cut_kpc = 30.0\n\n[ski]\npixels = 512\n",
        )
        .unwrap();

        let cfg = PrepConfig::from_file(&path).unwrap();
        assert_eq!(cfg.extract.r_cut_kpc, 30.0);
        assert_eq!(cfg.extract.dust_to_metals, 0.4);
        assert_eq!(cfg.ski.pixels, 512);
        assert_eq!(cfg.ski.num_wavelengths, 200);
    }

    #[test]
    fn test_foreign_sections_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[frames]\ncmap = \"viridis\"\n").unwrap();

        let cfg = PrepConfig::from_file(&path).unwrap();
        assert_eq!(cfg.extract.snapnum, 600);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = PrepConfig::from_file(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        assert!(matches!(err, PrepError::ConfigIo { .. }));
    }
}
