//! SKIRT parameter-file (.ski) generation.
//!
//! A .ski file is SKIRT's XML configuration dialect. The document layout is
//! fixed for this pipeline (ExtinctionOnly Monte Carlo, one ParticleSource,
//! one ParticleMedium with a Themis dust mix, an octree grid, and one
//! FrameInstrument per camera view), so it is rendered directly rather than
//! through a DOM.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use skirt_data::{RunMetadata, TableReader, TableWriter, View, ViewSet, Column};

use crate::config::PrepConfig;
use crate::error::PrepError;

/// Columns of the black-body star table variant.
const BB_COLUMNS: [Column; 6] = [
    Column::new("x", "kpc"),
    Column::new("y", "kpc"),
    Column::new("z", "kpc"),
    Column::new("hsml", "kpc"),
    Column::new("R", "km"),
    Column::new("T", "K"),
];

/// Stellar SED family emitted into the parameter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum SedFamily {
    /// Bruzual & Charlot population synthesis (Chabrier IMF, low resolution)
    #[value(name = "BruzualCharlotSEDFamily")]
    #[serde(rename = "BruzualCharlotSEDFamily")]
    BruzualCharlot,
    /// Single-temperature black bodies; rewrites the star table
    #[value(name = "BlackBodySEDFamily")]
    #[serde(rename = "BlackBodySEDFamily")]
    BlackBody,
}

/// CLI flags for `skirt_prep ski`. Unset flags fall back to the `[ski]`
/// config section.
#[derive(Debug, Args)]
pub struct SkiArgs {
    /// Run directory holding views.json, meta.json, and the tables
    #[arg(long, default_value = "run")]
    pub run_dir: PathBuf,

    /// Output file name within the run directory
    #[arg(long)]
    pub ski_name: Option<String>,

    /// Photon packets per simulation
    #[arg(long)]
    pub num_packets: Option<f64>,

    /// Wavelength grid lower bound, micron
    #[arg(long)]
    pub min_wavelength: Option<f64>,

    /// Wavelength grid upper bound, micron
    #[arg(long)]
    pub max_wavelength: Option<f64>,

    /// Number of wavelength grid points
    #[arg(long)]
    pub num_wavelengths: Option<u32>,

    /// Instrument distance, Mpc
    #[arg(long)]
    pub distance_mpc: Option<f64>,

    /// Square pixel count per instrument
    #[arg(long)]
    pub pixels: Option<u32>,

    /// Spatial grid minimum refinement level
    #[arg(long)]
    pub min_level: Option<u32>,

    /// Spatial grid maximum refinement level
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Cell subdivision threshold as a dust mass fraction
    #[arg(long)]
    pub max_dust_fraction: Option<f64>,

    /// Stellar SED family
    #[arg(long, value_enum)]
    pub sed_family: Option<SedFamily>,

    /// Black-body source radius, km
    #[arg(long)]
    pub bb_radius_km: Option<f64>,

    /// Black-body source temperature, K
    #[arg(long)]
    pub bb_temp_k: Option<f64>,
}

/// Everything the renderer needs to emit the document.
#[derive(Debug, Clone)]
pub struct SkiParams {
    pub num_packets: f64,
    pub min_wavelength: f64,
    pub max_wavelength: f64,
    pub num_wavelengths: u32,
    pub distance_mpc: f64,
    pub pixels: u32,
    pub min_level: u32,
    pub max_level: u32,
    pub max_dust_fraction: f64,
    pub r_cut_kpc: f64,
    pub dust_to_metals: f64,
    pub sed_family: SedFamily,
    pub star_filename: String,
}

/// Runs the parameter-file stage.
pub fn run(args: &SkiArgs, config: &PrepConfig) -> Result<(), PrepError> {
    let cfg = &config.ski;
    std::fs::create_dir_all(&args.run_dir).map_err(|e| PrepError::io(&args.run_dir, e))?;

    // r_cut and dust-to-metals come from the extraction metadata when the
    // sidecar exists; otherwise the extract-section defaults apply.
    let meta_path = args.run_dir.join("meta.json");
    let (r_cut_kpc, dust_to_metals) = if meta_path.exists() {
        let meta = RunMetadata::from_file(&meta_path)?;
        (meta.r_cut_kpc, meta.dust_to_metals)
    } else {
        (config.extract.r_cut_kpc, config.extract.dust_to_metals)
    };

    let views_path = args.run_dir.join("views.json");
    if !views_path.exists() {
        return Err(PrepError::NoViews { path: views_path });
    }
    let views = ViewSet::from_file(&views_path)?;
    if views.views.is_empty() {
        return Err(PrepError::NoViews { path: views_path });
    }

    let sed_family = args.sed_family.unwrap_or(cfg.sed_family);
    let star_filename = match sed_family {
        SedFamily::BruzualCharlot => "stars.txt".to_string(),
        SedFamily::BlackBody => {
            let radius_km = args.bb_radius_km.unwrap_or(cfg.bb_radius_km);
            let temp_k = args.bb_temp_k.unwrap_or(cfg.bb_temp_k);
            write_blackbody_table(&args.run_dir, radius_km, temp_k)?
        }
    };

    let params = SkiParams {
        num_packets: args.num_packets.unwrap_or(cfg.num_packets),
        min_wavelength: args.min_wavelength.unwrap_or(cfg.min_wavelength),
        max_wavelength: args.max_wavelength.unwrap_or(cfg.max_wavelength),
        num_wavelengths: args.num_wavelengths.unwrap_or(cfg.num_wavelengths),
        distance_mpc: args.distance_mpc.unwrap_or(cfg.distance_mpc),
        pixels: args.pixels.unwrap_or(cfg.pixels),
        min_level: args.min_level.unwrap_or(cfg.min_level),
        max_level: args.max_level.unwrap_or(cfg.max_level),
        max_dust_fraction: args.max_dust_fraction.unwrap_or(cfg.max_dust_fraction),
        r_cut_kpc,
        dust_to_metals,
        sed_family,
        star_filename,
    };

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let document = render_ski(&params, &views.views, &timestamp);

    let ski_name = args.ski_name.clone().unwrap_or_else(|| cfg.ski_name.clone());
    let out_path = args.run_dir.join(&ski_name);
    std::fs::write(&out_path, document).map_err(|e| PrepError::io(&out_path, e))?;
    info!(instruments = views.views.len(), path = %out_path.display(), "wrote ski file");
    if params.sed_family == SedFamily::BlackBody {
        info!("BlackBodySEDFamily selected; wrote {}", params.star_filename);
    }
    Ok(())
}

/// Rewrites the star table with constant black-body radius and temperature.
///
/// Keeps x, y, z, hsml from `stars.txt` and appends R (km) and T (K);
/// returns the new file name.
pub fn write_blackbody_table(
    run_dir: &Path,
    radius_km: f64,
    temp_k: f64,
) -> Result<String, PrepError> {
    let src = run_dir.join("stars.txt");
    if !src.exists() {
        return Err(PrepError::MissingInput { path: src });
    }
    let dst = run_dir.join("stars_bb.txt");

    let mut reader = TableReader::open(&src)?;
    let mut writer = TableWriter::create(&dst, &BB_COLUMNS)?;
    while let Some(row) = reader.next_row()? {
        if row.len() < 4 {
            continue;
        }
        writer.write_row(&[row[0], row[1], row[2], row[3], radius_km, temp_k])?;
    }
    writer.finish()?;
    Ok("stars_bb.txt".to_string())
}

/// Renders the full .ski XML document.
pub fn render_ski(params: &SkiParams, views: &[View], timestamp: &str) -> String {
    let mut instruments = String::new();
    for v in views {
        let _ = write!(
            instruments,
            "                    <FrameInstrument instrumentName=\"view_{idx:03}\" \
             distance=\"{dist} Mpc\" inclination=\"{theta:.6} deg\" azimuth=\"{phi:.6} deg\" \
             roll=\"0 deg\" fieldOfViewX=\"{fov:.6} kpc\" fieldOfViewY=\"{fov:.6} kpc\" \
             numPixelsX=\"{px}\" numPixelsY=\"{px}\"/>\n",
            idx = v.index,
            dist = params.distance_mpc,
            theta = v.theta_deg,
            phi = v.phi_deg,
            fov = 2.0 * params.r_cut_kpc,
            px = params.pixels,
        );
    }

    let sed_family_block = match params.sed_family {
        SedFamily::BruzualCharlot => concat!(
            "                        <sedFamily type=\"SEDFamily\">\n",
            "                            <BruzualCharlotSEDFamily imf=\"Chabrier\" resolution=\"Low\"/>\n",
            "                        </sedFamily>\n",
        ),
        SedFamily::BlackBody => concat!(
            "                        <sedFamily type=\"SEDFamily\">\n",
            "                            <BlackBodySEDFamily/>\n",
            "                        </sedFamily>\n",
        ),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- A SKIRT parameter file generated by the fire-skirt pipeline -->
<skirt-simulation-hierarchy type="MonteCarloSimulation" format="9" producer="fire-skirt pipeline" time="{timestamp}">
    <MonteCarloSimulation userLevel="Regular" simulationMode="ExtinctionOnly" iteratePrimaryEmission="false" iterateSecondaryEmission="false" numPackets="{num_packets}">
        <random type="Random">
            <Random seed="0"/>
        </random>
        <units type="Units">
            <ExtragalacticUnits wavelengthOutputStyle="Wavelength" fluxOutputStyle="Frequency"/>
        </units>
        <cosmology type="Cosmology">
            <LocalUniverseCosmology/>
        </cosmology>
        <sourceSystem type="SourceSystem">
            <SourceSystem minWavelength="{min_wl} micron" maxWavelength="{max_wl} micron" sourceBias="0.5">
                <sources type="Source">
                    <ParticleSource filename="{star_filename}">
{sed_family_block}                    </ParticleSource>
                </sources>
            </SourceSystem>
        </sourceSystem>
        <mediumSystem type="MediumSystem">
            <MediumSystem>
                <media type="Medium">
                    <ParticleMedium filename="gas.txt" massFraction="{dust_to_metals}" importMetallicity="true">
                        <materialMix type="MaterialMix">
                            <ThemisDustMix/>
                        </materialMix>
                    </ParticleMedium>
                </media>
                <grid type="SpatialGrid">
                    <PolicyTreeSpatialGrid minX="{neg_r_cut} kpc" maxX="{r_cut} kpc" minY="{neg_r_cut} kpc" maxY="{r_cut} kpc" minZ="{neg_r_cut} kpc" maxZ="{r_cut} kpc">
                        <policy type="TreePolicy">
                            <DensityTreePolicy minLevel="{min_level}" maxLevel="{max_level}" maxDustFraction="{max_dust_fraction}"/>
                        </policy>
                    </PolicyTreeSpatialGrid>
                </grid>
            </MediumSystem>
        </mediumSystem>
        <instrumentSystem type="InstrumentSystem">
            <InstrumentSystem>
                <defaultWavelengthGrid type="WavelengthGrid">
                    <LogWavelengthGrid minWavelength="{min_wl} micron" maxWavelength="{max_wl} micron" numWavelengths="{num_wl}"/>
                </defaultWavelengthGrid>
                <instruments type="Instrument">
{instruments}                </instruments>
            </InstrumentSystem>
        </instrumentSystem>
        <probeSystem type="ProbeSystem">
            <ProbeSystem/>
        </probeSystem>
    </MonteCarloSimulation>
</skirt-simulation-hierarchy>
"#,
        timestamp = timestamp,
        num_packets = params.num_packets,
        min_wl = params.min_wavelength,
        max_wl = params.max_wavelength,
        num_wl = params.num_wavelengths,
        star_filename = params.star_filename,
        sed_family_block = sed_family_block,
        dust_to_metals = params.dust_to_metals,
        r_cut = params.r_cut_kpc,
        neg_r_cut = -params.r_cut_kpc,
        min_level = params.min_level,
        max_level = params.max_level,
        max_dust_fraction = params.max_dust_fraction,
        instruments = instruments,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::fibonacci_sphere;
    use skirt_data::STAR_COLUMNS;
    use tempfile::tempdir;

    fn params(sed_family: SedFamily) -> SkiParams {
        SkiParams {
            num_packets: 2e5,
            min_wavelength: 0.09,
            max_wavelength: 100.0,
            num_wavelengths: 200,
            distance_mpc: 10.0,
            pixels: 256,
            min_level: 2,
            max_level: 6,
            max_dust_fraction: 1e-5,
            r_cut_kpc: 60.0,
            dust_to_metals: 0.4,
            sed_family,
            star_filename: "stars.txt".to_string(),
        }
    }

    #[test]
    fn test_one_instrument_per_view() {
        let views = fibonacci_sphere(8);
        let doc = render_ski(&params(SedFamily::BruzualCharlot), &views, "t");
        assert_eq!(doc.matches("<FrameInstrument").count(), 8);
        assert!(doc.contains("instrumentName=\"view_000\""));
        assert!(doc.contains("instrumentName=\"view_007\""));
    }

    #[test]
    fn test_parameter_substitution() {
        let views = fibonacci_sphere(1);
        let doc = render_ski(&params(SedFamily::BruzualCharlot), &views, "t");
        assert!(doc.contains("numPackets=\"200000\""));
        assert!(doc.contains("minX=\"-60 kpc\""));
        assert!(doc.contains("fieldOfViewX=\"120.000000 kpc\""));
        assert!(doc.contains("massFraction=\"0.4\""));
        assert!(doc.contains("<BruzualCharlotSEDFamily imf=\"Chabrier\" resolution=\"Low\"/>"));
    }

    #[test]
    fn test_blackbody_block() {
        let views = fibonacci_sphere(1);
        let mut p = params(SedFamily::BlackBody);
        p.star_filename = "stars_bb.txt".to_string();
        let doc = render_ski(&p, &views, "t");
        assert!(doc.contains("<BlackBodySEDFamily/>"));
        assert!(doc.contains("filename=\"stars_bb.txt\""));
        assert!(!doc.contains("BruzualCharlot"));
    }

    #[test]
    fn test_blackbody_table_rewrite() {
        let dir = tempdir().unwrap();
        let mut writer =
            TableWriter::create(&dir.path().join("stars.txt"), &STAR_COLUMNS).unwrap();
        writer
            .write_row(&[1.0, 2.0, 3.0, 0.5, 1e6, 0.02, 4.0])
            .unwrap();
        writer.finish().unwrap();

        let name = write_blackbody_table(dir.path(), 6.96e5, 5000.0).unwrap();
        assert_eq!(name, "stars_bb.txt");

        let rows = TableReader::open(&dir.path().join("stars_bb.txt"))
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec![1.0, 2.0, 3.0, 0.5, 6.96e5, 5000.0]);
    }

    #[test]
    fn test_blackbody_requires_star_table() {
        let dir = tempdir().unwrap();
        let err = write_blackbody_table(dir.path(), 1.0, 1.0).unwrap_err();
        assert!(matches!(err, PrepError::MissingInput { .. }));
    }
}
