//! Snapshot extraction: FIRE HDF5 chunks to SKIRT particle tables.
//!
//! Single pass over the snapshot chunks: recenter positions on the host
//! galaxy, drop particles outside the radial cutoff, convert units to
//! kpc/Msun/Gyr, and write `stars.txt`, `gas.txt`, and `meta.json`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Args;
use tracing::{info, warn};

use skirt_data::{
    HeaderAttrs, RunMetadata, TableWriter, CM_PER_KPC, GAS_COLUMNS, G_PER_MSUN, STAR_COLUMNS,
};

use crate::config::PrepConfig;
use crate::cosmology::Cosmology;
use crate::error::PrepError;
use crate::snapshot::{
    self, RawDataset, GAS_HSML_KEYS, GAS_METALLICITY_KEYS, STAR_FORM_TIME_KEYS,
    STAR_INIT_MASS_KEYS, STAR_METALLICITY_KEYS,
};

/// Formation times and scale factors above this are not scale factors.
const SCALE_FACTOR_CEILING: f64 = 1.1;

/// CLI flags for `skirt_prep extract`. Unset flags fall back to the
/// `[extract]` config section.
#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Glob matching the snapshot chunk files
    #[arg(long)]
    pub snapshot_glob: Option<String>,

    /// HDF5 file holding the host galaxy track
    #[arg(long)]
    pub host_coords: Option<String>,

    /// Output directory for tables and metadata
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Radial cutoff around the host, kpc
    #[arg(long)]
    pub r_cut_kpc: Option<f64>,

    /// Dust-to-metals mass ratio recorded for the medium
    #[arg(long)]
    pub dust_to_metals: Option<f64>,

    /// Position unit conversion to kpc
    #[arg(long)]
    pub pos_to_kpc: Option<f64>,

    /// Separate conversion for host-track positions (defaults to --pos-to-kpc)
    #[arg(long)]
    pub host_pos_to_kpc: Option<f64>,

    /// Mass unit conversion to Msun (default: from header, else 1)
    #[arg(long)]
    pub mass_to_msun: Option<f64>,

    /// Scale applied to metallicities
    #[arg(long)]
    pub metallicity_scale: Option<f64>,

    /// Column taken from 2-D metallicity arrays
    #[arg(long)]
    pub metallicity_column: Option<usize>,

    /// Constant smoothing length when none is available, kpc
    #[arg(long)]
    pub hsml_fallback_kpc: Option<f64>,

    /// Snapshot number used to index the host track
    #[arg(long)]
    pub snapnum: Option<u32>,
}

/// Runs the extraction stage.
pub fn run(args: &ExtractArgs, config: &PrepConfig) -> Result<(), PrepError> {
    let cfg = &config.extract;
    let snapshot_glob = args
        .snapshot_glob
        .clone()
        .unwrap_or_else(|| cfg.snapshot_glob.clone());
    let host_coords = PathBuf::from(
        args.host_coords
            .clone()
            .unwrap_or_else(|| cfg.host_coords.clone()),
    );
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.out_dir));
    let r_cut_kpc = args.r_cut_kpc.unwrap_or(cfg.r_cut_kpc);
    let dust_to_metals = args.dust_to_metals.unwrap_or(cfg.dust_to_metals);
    let pos_to_kpc = args.pos_to_kpc.unwrap_or(cfg.pos_to_kpc);
    let host_pos_to_kpc = args.host_pos_to_kpc.unwrap_or(pos_to_kpc);
    let metallicity_scale = args.metallicity_scale.unwrap_or(cfg.metallicity_scale);
    let metallicity_column = args.metallicity_column.unwrap_or(cfg.metallicity_column);
    let hsml_fallback_kpc = args.hsml_fallback_kpc.unwrap_or(cfg.hsml_fallback_kpc);
    let snapnum = args.snapnum.unwrap_or(cfg.snapnum);

    let mut snapshot_paths: Vec<PathBuf> = glob::glob(&snapshot_glob)?
        .filter_map(Result::ok)
        .collect();
    snapshot_paths.sort();
    if snapshot_paths.is_empty() {
        return Err(PrepError::NoSnapshots {
            pattern: snapshot_glob,
        });
    }
    info!(chunks = snapshot_paths.len(), "found snapshot chunks");

    std::fs::create_dir_all(&out_dir).map_err(|e| PrepError::io(&out_dir, e))?;

    let header = snapshot::read_header(&snapshot_paths[0])?;

    let mut meta = RunMetadata {
        snapshot_glob,
        snapshot_files: snapshot_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        host_coords: host_coords.display().to_string(),
        snapnum,
        r_cut_kpc,
        dust_to_metals,
        pos_to_kpc,
        host_pos_to_kpc,
        hsml_fallback_kpc,
        mass_to_msun_arg: args.mass_to_msun,
        metallicity_scale,
        metallicity_column_used: metallicity_column,
        created_utc: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ..Default::default()
    };

    if let Some(len_cm) = header.unit_length_in_cm {
        meta.pos_to_kpc_from_header = Some(len_cm / CM_PER_KPC);
    } else {
        meta.note(
            "pos_to_kpc",
            "UnitLengthInCm missing; using --pos-to-kpc (default 1.0 unless overridden)",
        );
        if let Some(h) = header.hubble_param {
            meta.pos_to_kpc_hint_from_hubble = Some(1.0 / h);
        }
    }
    if let Some(mass_g) = header.unit_mass_in_g {
        meta.mass_to_msun_from_header = Some(mass_g / G_PER_MSUN);
    } else {
        meta.note(
            "mass_to_msun",
            "UnitMassInG missing; using --mass-to-msun if provided, else 1.0",
        );
    }

    let mass_to_msun = args
        .mass_to_msun
        .or(meta.mass_to_msun_from_header)
        .unwrap_or(1.0);
    meta.mass_to_msun_used = mass_to_msun;

    let (host_raw, provenance) = snapshot::read_host_position(&host_coords, snapnum)?;
    let host_kpc = [
        host_raw[0] * host_pos_to_kpc,
        host_raw[1] * host_pos_to_kpc,
        host_raw[2] * host_pos_to_kpc,
    ];
    meta.host_position_dataset = provenance.position_dataset;
    meta.host_index_dataset = provenance.index_dataset;
    meta.host_position_raw = Some(host_raw);
    meta.host_position_kpc = Some(host_kpc);
    info!(
        x = host_kpc[0],
        y = host_kpc[1],
        z = host_kpc[2],
        "host position (kpc)"
    );

    let settings = Settings {
        r_cut_kpc,
        pos_to_kpc,
        mass_to_msun,
        metallicity_scale,
        metallicity_column,
        hsml_fallback_kpc,
        host_kpc,
    };

    let mut star_rows: Vec<[f64; 7]> = Vec::new();
    let mut gas_rows: Vec<[f64; 6]> = Vec::new();

    for path in &snapshot_paths {
        let file = snapshot::open_snapshot(path)?;
        if file.link_exists("PartType4") {
            collect_stars(&file.group("PartType4")?, &settings, &header, &mut meta, &mut star_rows)?;
        }
        if file.link_exists("PartType0") {
            collect_gas(&file.group("PartType0")?, &settings, &mut meta, &mut gas_rows)?;
        }
    }

    if star_rows.is_empty() {
        warn!("no star particles survived the radial cut");
    }
    if gas_rows.is_empty() {
        warn!("no gas cells survived the radial cut");
    }

    meta.header_attrs = header;

    let stars_path = out_dir.join("stars.txt");
    let gas_path = out_dir.join("gas.txt");
    let meta_path = out_dir.join("meta.json");

    let mut writer = TableWriter::create(&stars_path, &STAR_COLUMNS)?;
    for row in &star_rows {
        writer.write_row(row)?;
    }
    let n_stars = writer.finish()?;

    let mut writer = TableWriter::create(&gas_path, &GAS_COLUMNS)?;
    for row in &gas_rows {
        writer.write_row(row)?;
    }
    let n_gas = writer.finish()?;

    meta.to_file(&meta_path)?;

    info!(rows = n_stars, path = %stars_path.display(), "wrote star table");
    info!(rows = n_gas, path = %gas_path.display(), "wrote gas table");
    info!(path = %meta_path.display(), "wrote metadata");
    Ok(())
}

/// Resolved extraction parameters.
struct Settings {
    r_cut_kpc: f64,
    pos_to_kpc: f64,
    mass_to_msun: f64,
    metallicity_scale: f64,
    metallicity_column: usize,
    hsml_fallback_kpc: f64,
    host_kpc: [f64; 3],
}

/// Processes one chunk's star particles into output rows.
fn collect_stars(
    group: &hdf5::Group,
    settings: &Settings,
    header: &HeaderAttrs,
    meta: &mut RunMetadata,
    rows: &mut Vec<[f64; 7]>,
) -> Result<(), PrepError> {
    let coords = snapshot::read_dataset(group, "Coordinates")?;
    let masses = snapshot::read_dataset(group, "Masses")?;
    let z_key = snapshot::find_first_key(group, STAR_METALLICITY_KEYS);
    let ft_key = snapshot::find_first_key(group, STAR_FORM_TIME_KEYS);
    let im_key = snapshot::find_first_key(group, STAR_INIT_MASS_KEYS);

    record_key(&mut meta.star_keys_used, "Coordinates", "Coordinates");
    record_key(&mut meta.star_keys_used, "Masses", "Masses");
    if let Some(k) = &z_key {
        record_key(&mut meta.star_keys_used, "Metallicity", k);
    }
    if let Some(k) = &ft_key {
        record_key(&mut meta.star_keys_used, "FormationTime", k);
    }
    if let Some(k) = &im_key {
        record_key(&mut meta.star_keys_used, "InitialMass", k);
    }

    let z = match &z_key {
        Some(k) => Some(flatten_metallicity(
            snapshot::read_dataset(group, k)?,
            k,
            settings.metallicity_column,
            meta,
        )?),
        None => None,
    };
    let ft = match &ft_key {
        Some(k) => Some(snapshot::read_dataset(group, k)?.values),
        None => None,
    };
    let im = match &im_key {
        Some(k) => Some(snapshot::read_dataset(group, k)?.values),
        None => None,
    };

    let (centered, kept) = radial_cut(&coords, settings);
    meta.counts.stars_total += coords.rows() as u64;
    meta.counts.stars_kept += kept.len() as u64;

    let masses_kept = select(&masses.values, &kept);
    let z_kept = z.map(|v| select(&v, &kept));
    let ft_kept = ft.map(|v| select(&v, &kept));
    let im_kept = im.map(|v| select(&v, &kept));

    let ages = match &ft_kept {
        Some(ft) => compute_ages_gyr(ft, header, meta),
        None => {
            meta.note("age", "no formation time dataset found; setting ages to 0 Gyr");
            None
        }
    };
    let ages = ages.unwrap_or_else(|| vec![0.0; kept.len()]);

    let minit = match im_kept {
        Some(im) => im,
        None => {
            meta.note("initial_mass", "initial mass not found; using Masses as Minit");
            masses_kept.clone()
        }
    };

    for (i, pos) in centered.iter().enumerate() {
        rows.push([
            pos[0],
            pos[1],
            pos[2],
            settings.hsml_fallback_kpc,
            minit[i] * settings.mass_to_msun,
            z_kept.as_ref().map_or(0.0, |z| z[i]) * settings.metallicity_scale,
            ages[i],
        ]);
    }
    Ok(())
}

/// Processes one chunk's gas cells into output rows.
fn collect_gas(
    group: &hdf5::Group,
    settings: &Settings,
    meta: &mut RunMetadata,
    rows: &mut Vec<[f64; 6]>,
) -> Result<(), PrepError> {
    let coords = snapshot::read_dataset(group, "Coordinates")?;
    let masses = snapshot::read_dataset(group, "Masses")?;
    let z_key = snapshot::find_first_key(group, GAS_METALLICITY_KEYS);
    let h_key = snapshot::find_first_key(group, GAS_HSML_KEYS);

    record_key(&mut meta.gas_keys_used, "Coordinates", "Coordinates");
    record_key(&mut meta.gas_keys_used, "Masses", "Masses");
    if let Some(k) = &z_key {
        record_key(&mut meta.gas_keys_used, "Metallicity", k);
    }
    if let Some(k) = &h_key {
        record_key(&mut meta.gas_keys_used, "SmoothingLength", k);
    }

    let z = match &z_key {
        Some(k) => Some(flatten_metallicity(
            snapshot::read_dataset(group, k)?,
            k,
            settings.metallicity_column,
            meta,
        )?),
        None => None,
    };
    let hsml = match &h_key {
        Some(k) => Some(snapshot::read_dataset(group, k)?.values),
        None => None,
    };

    let (centered, kept) = radial_cut(&coords, settings);
    meta.counts.gas_total += coords.rows() as u64;
    meta.counts.gas_kept += kept.len() as u64;

    let masses_kept = select(&masses.values, &kept);
    let z_kept = z.map(|v| select(&v, &kept));
    let hsml_kept = match hsml {
        Some(h) => select(&h, &kept)
            .into_iter()
            .map(|h| h * settings.pos_to_kpc)
            .collect(),
        None => {
            meta.note("hsml", "SmoothingLength missing; using constant fallback");
            vec![settings.hsml_fallback_kpc; kept.len()]
        }
    };

    for (i, pos) in centered.iter().enumerate() {
        rows.push([
            pos[0],
            pos[1],
            pos[2],
            hsml_kept[i],
            masses_kept[i] * settings.mass_to_msun,
            z_kept.as_ref().map_or(0.0, |z| z[i]) * settings.metallicity_scale,
        ]);
    }
    Ok(())
}

/// Recenters coordinates on the host and keeps rows within the cutoff.
///
/// Returns the centered positions (kpc) of the surviving particles and
/// their original row indices, in order.
fn radial_cut(coords: &RawDataset, settings: &Settings) -> (Vec<[f64; 3]>, Vec<usize>) {
    let n = coords.rows();
    let mut centered = Vec::new();
    let mut kept = Vec::new();
    for i in 0..n {
        let x = coords.values[i * 3] * settings.pos_to_kpc - settings.host_kpc[0];
        let y = coords.values[i * 3 + 1] * settings.pos_to_kpc - settings.host_kpc[1];
        let z = coords.values[i * 3 + 2] * settings.pos_to_kpc - settings.host_kpc[2];
        if (x * x + y * y + z * z).sqrt() <= settings.r_cut_kpc {
            centered.push([x, y, z]);
            kept.push(i);
        }
    }
    (centered, kept)
}

/// Gathers `values[i]` for each kept index.
fn select(values: &[f64], kept: &[usize]) -> Vec<f64> {
    kept.iter().map(|&i| values[i]).collect()
}

fn record_key(map: &mut std::collections::BTreeMap<String, String>, quantity: &str, key: &str) {
    map.entry(quantity.to_string())
        .or_insert_with(|| key.to_string());
}

/// Reduces a metallicity dataset to one value per particle.
///
/// Accepts (N,) and (N,k) shapes; for multi-column arrays the requested
/// column is taken (clamped to range) and a note recorded.
fn flatten_metallicity(
    raw: RawDataset,
    dataset: &str,
    column: usize,
    meta: &mut RunMetadata,
) -> Result<Vec<f64>, PrepError> {
    match raw.shape.as_slice() {
        [_] => Ok(raw.values),
        [_, 1] => Ok(raw.values),
        [n, k] if *k > 1 => {
            let col = if column < *k { column } else { 0 };
            meta.note(
                "metallicity",
                format!("metallicity array has {} columns; using column {}", k, col),
            );
            Ok((0..*n).map(|i| raw.values[i * k + col]).collect())
        }
        _ => Err(PrepError::MetallicityShape {
            dataset: dataset.to_string(),
            shape: raw.shape,
        }),
    }
}

/// Stellar ages in Gyr from formation times, best effort.
///
/// Preference order: full ΛCDM conversion when formation times and the
/// current epoch both look like scale factors and the header carries a
/// cosmology; Δa as a proxy when the cosmology is missing; code time units
/// via UnitTimeInS; finally plain Time − t_form assuming Gyr. Returns None
/// when nothing can be interpreted.
fn compute_ages_gyr(
    form_time: &[f64],
    header: &HeaderAttrs,
    meta: &mut RunMetadata,
) -> Option<Vec<f64>> {
    if form_time.is_empty() {
        return Some(Vec::new());
    }
    let ft_max = form_time.iter().copied().fold(f64::NAN, f64::max);
    let a_now = header.time;

    if let Some(a_now) = a_now {
        if a_now <= SCALE_FACTOR_CEILING && ft_max <= SCALE_FACTOR_CEILING {
            if let (Some(omega_m), Some(omega_l), Some(h)) =
                (header.omega0, header.omega_lambda, header.hubble_param)
            {
                let cosmo = Cosmology {
                    omega_m,
                    omega_l,
                    hubble_param: h,
                };
                let t_now = cosmo.cosmic_time_gyr_scalar(a_now);
                let t_form = cosmo.cosmic_time_gyr(form_time);
                meta.note(
                    "age",
                    "ages computed from scale factor using LCDM with Omega0, OmegaLambda, HubbleParam",
                );
                meta.age_now_gyr = Some(t_now);
                return Some(t_form.iter().map(|&t| (t_now - t).max(0.0)).collect());
            }
            meta.note(
                "age",
                "formation time looks like scale factor but cosmology missing; using delta(a) as age proxy",
            );
            return Some(form_time.iter().map(|&a| (a_now - a).max(0.0)).collect());
        }

        if let Some(unit_time_s) = header.unit_time_in_s {
            let t_unit_gyr = unit_time_s / skirt_data::SEC_PER_GYR;
            meta.note("age", "ages computed from code time units using UnitTimeInS");
            return Some(
                form_time
                    .iter()
                    .map(|&t| ((a_now - t) * t_unit_gyr).max(0.0))
                    .collect(),
            );
        }

        meta.note(
            "age",
            "ages computed as Time - formation time; assuming both are in Gyr",
        );
        return Some(form_time.iter().map(|&t| (a_now - t).max(0.0)).collect());
    }

    meta.note("age", "could not interpret formation times; setting ages to 0 Gyr");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            r_cut_kpc: 10.0,
            pos_to_kpc: 1.0,
            mass_to_msun: 1.0,
            metallicity_scale: 1.0,
            metallicity_column: 0,
            hsml_fallback_kpc: 0.5,
            host_kpc: [100.0, 100.0, 100.0],
        }
    }

    #[test]
    fn test_radial_cut_keeps_inside_only() {
        let coords = RawDataset {
            values: vec![
                100.0, 100.0, 100.0, // at the host
                105.0, 100.0, 100.0, // 5 kpc away
                120.0, 100.0, 100.0, // 20 kpc away
            ],
            shape: vec![3, 3],
        };
        let (centered, kept) = radial_cut(&coords, &settings());
        assert_eq!(kept, vec![0, 1]);
        assert_eq!(centered[0], [0.0, 0.0, 0.0]);
        assert_eq!(centered[1], [5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_radial_cut_boundary_inclusive() {
        let coords = RawDataset {
            values: vec![110.0, 100.0, 100.0],
            shape: vec![1, 3],
        };
        let (_, kept) = radial_cut(&coords, &settings());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_flatten_metallicity_1d_passthrough() {
        let mut meta = RunMetadata::default();
        let raw = RawDataset {
            values: vec![0.01, 0.02],
            shape: vec![2],
        };
        let z = flatten_metallicity(raw, "Metallicity", 0, &mut meta).unwrap();
        assert_eq!(z, vec![0.01, 0.02]);
        assert!(meta.notes.is_empty());
    }

    #[test]
    fn test_flatten_metallicity_takes_column() {
        let mut meta = RunMetadata::default();
        let raw = RawDataset {
            values: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            shape: vec![2, 3],
        };
        let z = flatten_metallicity(raw, "GFM_Metallicity", 1, &mut meta).unwrap();
        assert_eq!(z, vec![0.2, 0.5]);
        assert!(meta.notes["metallicity"].contains("column 1"));
    }

    #[test]
    fn test_flatten_metallicity_clamps_bad_column() {
        let mut meta = RunMetadata::default();
        let raw = RawDataset {
            values: vec![0.1, 0.2, 0.3, 0.4],
            shape: vec![2, 2],
        };
        let z = flatten_metallicity(raw, "Z", 9, &mut meta).unwrap();
        assert_eq!(z, vec![0.1, 0.3]);
    }

    #[test]
    fn test_flatten_metallicity_rejects_3d() {
        let mut meta = RunMetadata::default();
        let raw = RawDataset {
            values: vec![0.0; 8],
            shape: vec![2, 2, 2],
        };
        let err = flatten_metallicity(raw, "Z", 0, &mut meta).unwrap_err();
        assert!(matches!(err, PrepError::MetallicityShape { .. }));
    }

    #[test]
    fn test_ages_from_scale_factor() {
        let mut meta = RunMetadata::default();
        let header = HeaderAttrs {
            time: Some(1.0),
            omega0: Some(0.31),
            omega_lambda: Some(0.69),
            hubble_param: Some(0.68),
            ..Default::default()
        };
        let ages = compute_ages_gyr(&[0.5, 1.0], &header, &mut meta).unwrap();
        // A star formed at a = 0.5 is several Gyr old; one formed now is ~0.
        assert!(ages[0] > 5.0 && ages[0] < 10.0, "ages = {ages:?}");
        assert!(ages[1].abs() < 1e-6);
        assert!(meta.age_now_gyr.unwrap() > 13.0);
    }

    #[test]
    fn test_ages_delta_a_proxy_without_cosmology() {
        let mut meta = RunMetadata::default();
        let header = HeaderAttrs {
            time: Some(1.0),
            ..Default::default()
        };
        let ages = compute_ages_gyr(&[0.25, 1.0], &header, &mut meta).unwrap();
        assert_eq!(ages, vec![0.75, 0.0]);
        assert!(meta.notes["age"].contains("proxy"));
    }

    #[test]
    fn test_ages_from_code_time_units() {
        let mut meta = RunMetadata::default();
        let header = HeaderAttrs {
            time: Some(10.0),
            unit_time_in_s: Some(skirt_data::SEC_PER_GYR),
            ..Default::default()
        };
        // Time 10.0 exceeds the scale-factor ceiling, so the code-units
        // branch applies: one unit equals one Gyr here.
        let ages = compute_ages_gyr(&[4.0], &header, &mut meta).unwrap();
        assert_eq!(ages, vec![6.0]);
    }

    #[test]
    fn test_ages_clamped_at_zero() {
        let mut meta = RunMetadata::default();
        let header = HeaderAttrs {
            time: Some(1.0),
            ..Default::default()
        };
        let ages = compute_ages_gyr(&[1.05], &header, &mut meta).unwrap();
        assert_eq!(ages, vec![0.0]);
    }

    #[test]
    fn test_ages_unavailable_without_time() {
        let mut meta = RunMetadata::default();
        let header = HeaderAttrs::default();
        assert!(compute_ages_gyr(&[0.5], &header, &mut meta).is_none());
        assert!(meta.notes["age"].contains("could not interpret"));
    }
}
