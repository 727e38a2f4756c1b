//! Quick sanity checks over pipeline outputs.
//!
//! Streams the particle tables without loading them (they can run to tens of
//! millions of rows), tracking per-column count/min/max and a fixed-size
//! reservoir sample for medians. Out-of-range statistics only warn; missing
//! input files and missing per-view FITS images are fatal.

use std::path::{Path, PathBuf};

use clap::Args;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use skirt_data::{TableReader, ViewSet};

use crate::error::PrepError;

/// Reservoir size per tracked column.
const SAMPLE_MAX: usize = 200_000;

/// Fixed seed so repeated checks report identical medians.
const SAMPLE_SEED: u64 = 0;

/// Metallicity values outside this range are suspicious.
const Z_RANGE: (f64, f64) = (0.0, 0.1);

/// Coordinate medians further than this from the origin suggest a bad
/// host centering, kpc.
const CENTER_TOLERANCE_KPC: f64 = 1.0;

/// CLI flags for `skirt_prep check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Run directory holding the tables and views.json
    #[arg(long, default_value = "run")]
    pub run_dir: PathBuf,

    /// Skip the per-view FITS image check
    #[arg(long)]
    pub skip_images: bool,

    /// Directory holding SKIRT output images (default: the run directory)
    #[arg(long)]
    pub image_dir: Option<PathBuf>,
}

/// Streaming statistics for one table column.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    sample: Vec<f64>,
}

impl ColumnStats {
    fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sample: Vec::new(),
        }
    }

    /// Feeds one value; `seen` is the number of rows observed so far.
    fn update(&mut self, v: f64, seen: u64, rng: &mut SmallRng) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        if self.sample.len() < SAMPLE_MAX {
            self.sample.push(v);
        } else {
            let j = rng.gen_range(0..seen) as usize;
            if j < SAMPLE_MAX {
                self.sample[j] = v;
            }
        }
    }

    /// Median of the reservoir sample; NaN when no rows were seen.
    pub fn median(&self) -> f64 {
        if self.sample.is_empty() {
            return f64::NAN;
        }
        let mut sorted = self.sample.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        }
    }
}

/// Statistics over the requested columns of one table.
#[derive(Debug, Clone)]
pub struct TableStats {
    pub count: u64,
    pub columns: Vec<ColumnStats>,
}

/// Streams a table and accumulates statistics for `usecols`.
///
/// Rows too short to carry every requested column are skipped, matching the
/// tolerant behavior expected of a sanity checker.
pub fn stream_stats(path: &Path, usecols: &[usize]) -> Result<TableStats, PrepError> {
    let max_col = usecols.iter().copied().max().unwrap_or(0);
    let mut rng = SmallRng::seed_from_u64(SAMPLE_SEED);
    let mut count: u64 = 0;
    let mut columns: Vec<ColumnStats> = usecols.iter().map(|_| ColumnStats::new()).collect();

    let mut reader = TableReader::open(path)?;
    while let Some(row) = reader.next_row()? {
        if row.len() <= max_col {
            continue;
        }
        count += 1;
        for (slot, &col) in columns.iter_mut().zip(usecols) {
            slot.update(row[col], count, &mut rng);
        }
    }
    Ok(TableStats { count, columns })
}

/// Runs the check stage.
pub fn run(args: &CheckArgs) -> Result<(), PrepError> {
    let stars_path = args.run_dir.join("stars.txt");
    let gas_path = args.run_dir.join("gas.txt");
    for path in [&stars_path, &gas_path] {
        if !path.exists() {
            return Err(PrepError::MissingInput { path: path.clone() });
        }
    }

    // x, y, z and metallicity; column 5 is Z in both tables.
    let stars = stream_stats(&stars_path, &[0, 1, 2, 5])?;
    let gas = stream_stats(&gas_path, &[0, 1, 2, 5])?;

    report("stars", &stars);
    report("gas", &gas);

    if !args.skip_images {
        let views_path = args.run_dir.join("views.json");
        if !views_path.exists() {
            return Err(PrepError::MissingInput { path: views_path });
        }
        let views = ViewSet::from_file(&views_path)?;
        let image_dir = args.image_dir.clone().unwrap_or_else(|| args.run_dir.clone());
        let missing = missing_images(&image_dir, &views)?;
        if !missing.is_empty() {
            return Err(PrepError::MissingImages {
                count: missing.len(),
                first: missing.into_iter().take(10).collect(),
            });
        }
        info!(views = views.views.len(), "found images for all views");
    }
    Ok(())
}

/// Logs one table's statistics and any out-of-range warnings.
fn report(species: &str, stats: &TableStats) {
    let medians: Vec<f64> = stats.columns.iter().map(|c| c.median()).collect();
    info!(
        count = stats.count,
        x_median = medians[0],
        y_median = medians[1],
        z_median = medians[2],
        z_min = stats.columns[3].min,
        z_max = stats.columns[3].max,
        "{} table statistics",
        species
    );

    if stats.count == 0 {
        warn!("{} table is empty", species);
        return;
    }
    if stats.columns[3].min < Z_RANGE.0 || stats.columns[3].max > Z_RANGE.1 {
        warn!(
            min = stats.columns[3].min,
            max = stats.columns[3].max,
            "{} metallicity out of [{}, {}]",
            species,
            Z_RANGE.0,
            Z_RANGE.1
        );
    }
    for (axis, median) in ["x", "y", "z"].iter().zip(&medians) {
        if median.abs() > CENTER_TOLERANCE_KPC {
            warn!(
                "{} {}-median {:.3} kpc not centered",
                species, axis, median
            );
        }
    }
}

/// Returns the view indices with no matching FITS image.
fn missing_images(image_dir: &Path, views: &ViewSet) -> Result<Vec<usize>, PrepError> {
    let mut missing = Vec::new();
    for view in &views.views {
        let pattern = format!("{}/*view_{:03}_*.fits", image_dir.display(), view.index);
        let found = glob::glob(&pattern)?.filter_map(Result::ok).next().is_some();
        if !found {
            missing.push(view.index);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirt_data::{TableWriter, View, GAS_COLUMNS};
    use tempfile::tempdir;

    fn write_gas(dir: &Path, rows: &[[f64; 6]]) -> PathBuf {
        let path = dir.join("gas.txt");
        let mut writer = TableWriter::create(&path, &GAS_COLUMNS).unwrap();
        for row in rows {
            writer.write_row(row).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_stream_stats_minmax_and_median() {
        let dir = tempdir().unwrap();
        let path = write_gas(
            dir.path(),
            &[
                [1.0, 0.0, 0.0, 0.5, 1.0, 0.01],
                [2.0, 0.0, 0.0, 0.5, 1.0, 0.02],
                [3.0, 0.0, 0.0, 0.5, 1.0, 0.03],
            ],
        );
        let stats = stream_stats(&path, &[0, 5]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.columns[0].min, 1.0);
        assert_eq!(stats.columns[0].max, 3.0);
        assert_eq!(stats.columns[0].median(), 2.0);
        assert!((stats.columns[1].median() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_stream_stats_even_count_median() {
        let dir = tempdir().unwrap();
        let path = write_gas(
            dir.path(),
            &[
                [1.0, 0.0, 0.0, 0.5, 1.0, 0.0],
                [2.0, 0.0, 0.0, 0.5, 1.0, 0.0],
                [3.0, 0.0, 0.0, 0.5, 1.0, 0.0],
                [4.0, 0.0, 0.0, 0.5, 1.0, 0.0],
            ],
        );
        let stats = stream_stats(&path, &[0]).unwrap();
        assert_eq!(stats.columns[0].median(), 2.5);
    }

    #[test]
    fn test_stream_stats_empty_table() {
        let dir = tempdir().unwrap();
        let path = write_gas(dir.path(), &[]);
        let stats = stream_stats(&path, &[0, 1]).unwrap();
        assert_eq!(stats.count, 0);
        assert!(stats.columns[0].median().is_nan());
    }

    #[test]
    fn test_missing_images_reports_absent_views() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("galaxy_view_000_total.fits"), b"").unwrap();

        let views = ViewSet {
            num_views: 2,
            method: "fibonacci_sphere".to_string(),
            created_utc: String::new(),
            views: vec![
                View::from_direction(0, [0.0, 0.0, 1.0]),
                View::from_direction(1, [0.0, 0.0, -1.0]),
            ],
        };
        let missing = missing_images(dir.path(), &views).unwrap();
        assert_eq!(missing, vec![1]);
    }

    #[test]
    fn test_run_requires_tables() {
        let dir = tempdir().unwrap();
        let args = CheckArgs {
            run_dir: dir.path().to_path_buf(),
            skip_images: true,
            image_dir: None,
        };
        let err = run(&args).unwrap_err();
        assert!(matches!(err, PrepError::MissingInput { .. }));
    }
}
