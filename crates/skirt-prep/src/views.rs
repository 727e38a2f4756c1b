//! Camera view generation and the camera-position report.
//!
//! Views are unit directions on a Fibonacci sphere lattice, the standard
//! trick for near-even point distribution on a sphere: azimuth advances by
//! the golden angle while cos θ steps uniformly through [−1, 1].

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Args;
use tracing::info;

use skirt_data::{View, ViewSet};

use crate::error::PrepError;

/// CLI flags for `skirt_prep views`.
#[derive(Debug, Args)]
pub struct ViewsArgs {
    /// Output directory for views.json
    #[arg(long, default_value = "run")]
    pub out_dir: PathBuf,

    /// Number of camera directions to generate
    #[arg(long, default_value_t = 32)]
    pub num_views: usize,
}

/// CLI flags for `skirt_prep cameras`.
#[derive(Debug, Args)]
pub struct CamerasArgs {
    /// Path to views.json
    #[arg(long, default_value = "run/views.json")]
    pub views: PathBuf,

    /// Camera distance in Mpc
    #[arg(long, default_value_t = 10.0)]
    pub distance_mpc: f64,

    /// Output text file (default: camera_positions.txt next to views.json)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Generates `n` unit directions on the Fibonacci sphere lattice.
pub fn fibonacci_sphere(n: usize) -> Vec<View> {
    let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
    (0..n)
        .map(|i| {
            let phi = 2.0 * std::f64::consts::PI * i as f64 / golden_ratio;
            let cos_theta = (1.0 - 2.0 * (i as f64 + 0.5) / n as f64).clamp(-1.0, 1.0);
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            View::from_direction(
                i,
                [phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta],
            )
        })
        .collect()
}

/// Runs the view-generation stage.
pub fn run_views(args: &ViewsArgs) -> Result<(), PrepError> {
    std::fs::create_dir_all(&args.out_dir).map_err(|e| PrepError::io(&args.out_dir, e))?;

    let set = ViewSet {
        num_views: args.num_views,
        method: "fibonacci_sphere".to_string(),
        created_utc: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        views: fibonacci_sphere(args.num_views),
    };

    let out_path = args.out_dir.join("views.json");
    set.to_file(&out_path)?;
    info!(views = args.num_views, path = %out_path.display(), "wrote view list");
    Ok(())
}

/// Runs the camera-position report stage.
pub fn run_cameras(args: &CamerasArgs) -> Result<(), PrepError> {
    let set = ViewSet::from_file(&args.views)?;
    if set.views.is_empty() {
        return Err(PrepError::NoViews {
            path: args.views.clone(),
        });
    }

    let out_path = match &args.out {
        Some(p) => p.clone(),
        None => args
            .views
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("camera_positions.txt"),
    };

    let report = camera_report(&set, args.distance_mpc);
    std::fs::write(&out_path, report).map_err(|e| PrepError::io(&out_path, e))?;
    info!(views = set.views.len(), path = %out_path.display(), "wrote camera positions");
    Ok(())
}

/// Renders the fixed-width camera-position table.
fn camera_report(set: &ViewSet, distance_mpc: f64) -> String {
    let d_kpc = distance_mpc * 1000.0;
    let mut out = String::new();
    out.push_str(
        "# index theta_deg phi_deg  dx dy dz  cam_x_Mpc cam_y_Mpc cam_z_Mpc  \
         cam_x_kpc cam_y_kpc cam_z_kpc\n",
    );
    for v in &set.views {
        let [dx, dy, dz] = v.dir;
        let _ = writeln_row(&mut out, v, dx, dy, dz, distance_mpc, d_kpc);
    }
    out
}

fn writeln_row(
    out: &mut String,
    v: &View,
    dx: f64,
    dy: f64,
    dz: f64,
    d_mpc: f64,
    d_kpc: f64,
) -> std::fmt::Result {
    use std::fmt::Write as _;
    writeln!(
        out,
        "{:2} {:12.6} {:12.6} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8}",
        v.index,
        v.theta_deg,
        v.phi_deg,
        dx,
        dy,
        dz,
        d_mpc * dx,
        d_mpc * dy,
        d_mpc * dz,
        d_kpc * dx,
        d_kpc * dy,
        d_kpc * dz,
    )
}
