//! Read-only access to FIRE snapshot and host-track HDF5 files.
//!
//! FIRE outputs do not use a single dataset naming convention, so the
//! extractor probes an ordered list of candidate keys per quantity and
//! records which one it settled on. The host-track file is even less
//! standardized; we walk every dataset in it and score the candidates by
//! name and shape.

use std::path::Path;

use hdf5::{Dataset, File, Group};
use tracing::debug;

use skirt_data::HeaderAttrs;

use crate::error::PrepError;

/// Candidate dataset names for stellar metallicity, in priority order.
pub const STAR_METALLICITY_KEYS: &[&str] = &[
    "GFM_Metallicity",
    "Metallicity",
    "StellarMetallicity",
    "Z",
];

/// Candidate dataset names for stellar formation time.
pub const STAR_FORM_TIME_KEYS: &[&str] = &[
    "GFM_StellarFormationTime",
    "StellarFormationTime",
    "FormationTime",
];

/// Candidate dataset names for stellar initial mass.
pub const STAR_INIT_MASS_KEYS: &[&str] = &["GFM_InitialMass", "InitialMass", "BirthMass"];

/// Candidate dataset names for gas metallicity.
pub const GAS_METALLICITY_KEYS: &[&str] = &["GFM_Metallicity", "Metallicity", "Z"];

/// Candidate dataset names for the gas smoothing length.
pub const GAS_HSML_KEYS: &[&str] = &["SmoothingLength", "HSML", "Hsml"];

/// Name fragments that mark a dataset as a snapshot-number index.
const INDEX_NAME_HINTS: &[&str] = &["snap", "snapshot", "snapnum", "snap_num", "index"];

/// Returns the first candidate key that exists in the group.
pub fn find_first_key(group: &Group, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|k| group.link_exists(k))
        .map(|k| k.to_string())
}

/// A numeric dataset read into memory with its original shape.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub values: Vec<f64>,
    pub shape: Vec<usize>,
}

impl RawDataset {
    /// Number of rows along the first axis.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

/// Reads a whole dataset as f64 regardless of its stored numeric type.
pub fn read_dataset(group: &Group, name: &str) -> Result<RawDataset, PrepError> {
    let ds = group.dataset(name)?;
    Ok(RawDataset {
        shape: ds.shape(),
        values: ds.read_raw::<f64>()?,
    })
}

/// Reads the scalar header attributes the pipeline consumes.
///
/// Attributes that are absent (or not scalar-convertible) stay `None`; the
/// names of those found are collected in `present`.
pub fn read_header(path: &Path) -> Result<HeaderAttrs, PrepError> {
    let file = File::open(path).map_err(|e| wrap_open(path, e))?;
    let mut attrs = HeaderAttrs::default();
    if !file.link_exists("Header") {
        return Ok(attrs);
    }
    let header = file.group("Header")?;

    let mut read = |name: &str, slot: &mut Option<f64>, present: &mut Vec<String>| {
        if let Ok(attr) = header.attr(name) {
            if let Ok(v) = attr.read_scalar::<f64>() {
                *slot = Some(v);
                present.push(name.to_string());
            }
        }
    };

    let mut present = Vec::new();
    read("Time", &mut attrs.time, &mut present);
    read("Redshift", &mut attrs.redshift, &mut present);
    read("Omega0", &mut attrs.omega0, &mut present);
    read("OmegaLambda", &mut attrs.omega_lambda, &mut present);
    read("HubbleParam", &mut attrs.hubble_param, &mut present);
    read("UnitLengthInCm", &mut attrs.unit_length_in_cm, &mut present);
    read("UnitMassInG", &mut attrs.unit_mass_in_g, &mut present);
    read("UnitTimeInS", &mut attrs.unit_time_in_s, &mut present);
    read("BoxSize", &mut attrs.box_size, &mut present);
    read(
        "NumFilesPerSnapshot",
        &mut attrs.num_files_per_snapshot,
        &mut present,
    );
    attrs.present = present;
    Ok(attrs)
}

/// Opens a snapshot chunk.
pub fn open_snapshot(path: &Path) -> Result<File, PrepError> {
    File::open(path).map_err(|e| wrap_open(path, e))
}

fn wrap_open(path: &Path, err: hdf5::Error) -> PrepError {
    if path.exists() {
        PrepError::Hdf5(err)
    } else {
        PrepError::MissingInput {
            path: path.to_path_buf(),
        }
    }
}

/// Where the host position came from, for the metadata record.
#[derive(Debug, Clone, Default)]
pub struct HostProvenance {
    pub position_dataset: Option<String>,
    pub index_dataset: Option<String>,
}

/// Locates the host galaxy position for a snapshot number.
///
/// The row index comes from a 1-D dataset whose name suggests a snapshot
/// index and which contains `snapnum`; failing that, the row index defaults
/// to the snapshot number itself when in range. The position dataset is the
/// best-scoring dataset with a 3-vector-compatible shape.
pub fn read_host_position(
    path: &Path,
    snapnum: u32,
) -> Result<([f64; 3], HostProvenance), PrepError> {
    if !path.exists() {
        return Err(PrepError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;

    let mut datasets = Vec::new();
    collect_datasets(&file, "", &mut datasets)?;
    debug!(count = datasets.len(), "host file datasets collected");

    // Pass 1: a snapshot-index dataset naming the row to use.
    let mut snap_index: Option<usize> = None;
    let mut index_dataset: Option<String> = None;
    for (name, ds) in &datasets {
        let lname = name.to_lowercase();
        if ds.ndim() == 1 && INDEX_NAME_HINTS.iter().any(|h| lname.contains(h)) {
            let arr = ds.read_raw::<f64>()?;
            if let Some(pos) = arr.iter().position(|&v| v == snapnum as f64) {
                snap_index = Some(pos);
                index_dataset = Some(name.clone());
                break;
            }
        }
    }

    // Pass 2: the position dataset, scored by name.
    let mut candidates: Vec<(i32, &String, &Dataset)> = Vec::new();
    for (name, ds) in &datasets {
        let shape = ds.shape();
        let shape_ok = match shape.len() {
            2 => shape[1] == 3 || shape[0] == 3,
            3 => shape.contains(&3),
            _ => false,
        };
        if !shape_ok {
            continue;
        }
        let lname = name.to_lowercase();
        let mut score = 0;
        if lname.contains("host") {
            score += 3;
        }
        if lname.contains("coord") || lname.contains("pos") {
            score += 2;
        }
        candidates.push((score, name, ds));
    }
    if candidates.is_empty() {
        return Err(PrepError::NoHostPosition {
            path: path.to_path_buf(),
        });
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    let (_, pos_name, pos_ds) = candidates[0];
    let shape = pos_ds.shape();

    // No index dataset: assume the row index equals the snapshot number.
    let snap_index = match snap_index {
        Some(i) => i,
        None => {
            let n = snapnum as usize;
            let rows_first = shape[0];
            let rows_last = shape[shape.len() - 1];
            if rows_first > n || (shape[0] == 3 && rows_last > n) {
                n
            } else {
                return Err(PrepError::HostIndexNotFound {
                    path: path.to_path_buf(),
                    snapnum,
                });
            }
        }
    };

    let flat = pos_ds.read_raw::<f64>()?;
    let pos = extract_vec3(&flat, &shape, snap_index).ok_or_else(|| {
        PrepError::HostPositionShape {
            path: path.to_path_buf(),
            shape: shape.clone(),
        }
    })?;

    Ok((
        pos,
        HostProvenance {
            position_dataset: Some(pos_name.clone()),
            index_dataset,
        },
    ))
}

/// Pulls row `idx` as a 3-vector out of a row-major array.
///
/// Handles (N,3), (3,N), and the degenerate 3-D layouts (N,1,3), (1,N,3),
/// (3,N,1) that halo trackers occasionally emit.
fn extract_vec3(flat: &[f64], shape: &[usize], idx: usize) -> Option<[f64; 3]> {
    let get3 = |a: usize, b: usize, c: usize| -> Option<[f64; 3]> {
        Some([*flat.get(a)?, *flat.get(b)?, *flat.get(c)?])
    };
    match shape {
        [_, 3] => get3(idx * 3, idx * 3 + 1, idx * 3 + 2),
        [3, n] => get3(idx, n + idx, 2 * n + idx),
        [_, 1, 3] => get3(idx * 3, idx * 3 + 1, idx * 3 + 2),
        [1, _, 3] => get3(idx * 3, idx * 3 + 1, idx * 3 + 2),
        [3, n, 1] => get3(idx, n + idx, 2 * n + idx),
        _ => None,
    }
}

/// Recursively collects every dataset under a group, keyed by its path.
fn collect_datasets(
    group: &Group,
    prefix: &str,
    out: &mut Vec<(String, Dataset)>,
) -> Result<(), PrepError> {
    for name in group.member_names()? {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        if let Ok(ds) = group.dataset(&name) {
            out.push((path, ds));
        } else if let Ok(sub) = group.group(&name) {
            collect_datasets(&sub, &path, out)?;
        }
    }
    Ok(())
}
