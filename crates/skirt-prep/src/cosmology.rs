//! Cosmic time from scale factor for a ΛCDM universe.
//!
//! FIRE snapshots store stellar formation times as scale factors. Converting
//! them to ages requires t(a) = (1/H0) ∫ da' / (a'·E(a')), which has no
//! closed form for general Ω, so we integrate once on a dense scale-factor
//! grid with the trapezoid rule and interpolate lookups against that grid.

use skirt_data::{KM_PER_MPC, SEC_PER_GYR};

/// Number of grid points for the cumulative integral.
const GRID_POINTS: usize = 10_000;

/// Lower edge of the scale-factor grid; t(A_FLOOR) is treated as 0.
const A_FLOOR: f64 = 1e-4;

/// ΛCDM parameters as stored in a Gadget-style snapshot header.
///
/// `hubble_param` is the dimensionless h (H0 = 100·h km/s/Mpc). Curvature
/// follows from Ωm + ΩΛ; it is not assumed flat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cosmology {
    pub omega_m: f64,
    pub omega_l: f64,
    pub hubble_param: f64,
}

impl Cosmology {
    /// Hubble time 1/H0 in Gyr.
    pub fn hubble_time_gyr(&self) -> f64 {
        let h0_per_s = 100.0 * self.hubble_param / KM_PER_MPC;
        (1.0 / h0_per_s) / SEC_PER_GYR
    }

    /// Dimensionless expansion rate E(a) = H(a)/H0.
    fn expansion_rate(&self, a: f64) -> f64 {
        let omega_k = 1.0 - self.omega_m - self.omega_l;
        (self.omega_m / a.powi(3) + omega_k / a.powi(2) + self.omega_l).sqrt()
    }

    /// Cosmic time in Gyr at each of the given scale factors.
    ///
    /// Queries below the grid floor clamp to 0; NaN inputs yield NaN.
    pub fn cosmic_time_gyr(&self, scale_factors: &[f64]) -> Vec<f64> {
        let a_max = scale_factors
            .iter()
            .copied()
            .filter(|a| a.is_finite())
            .fold(A_FLOOR, f64::max);

        let (a_grid, t_grid) = self.time_grid(a_max);
        scale_factors
            .iter()
            .map(|&a| interp_clamped(a, &a_grid, &t_grid))
            .collect()
    }

    /// Cosmic time in Gyr at a single scale factor.
    pub fn cosmic_time_gyr_scalar(&self, a: f64) -> f64 {
        self.cosmic_time_gyr(&[a])[0]
    }

    /// Builds the cumulative-trapezoid time grid up to `a_max`.
    fn time_grid(&self, a_max: f64) -> (Vec<f64>, Vec<f64>) {
        let a_max = a_max.max(A_FLOOR);
        let step = (a_max - A_FLOOR) / (GRID_POINTS - 1) as f64;
        let a_grid: Vec<f64> = (0..GRID_POINTS).map(|i| A_FLOOR + step * i as f64).collect();

        let integrand: Vec<f64> = a_grid
            .iter()
            .map(|&a| 1.0 / (a * self.expansion_rate(a)))
            .collect();

        let t_h = self.hubble_time_gyr();
        let mut t_grid = Vec::with_capacity(GRID_POINTS);
        let mut acc = 0.0;
        t_grid.push(0.0);
        for i in 1..GRID_POINTS {
            let da = a_grid[i] - a_grid[i - 1];
            acc += 0.5 * (integrand[i] + integrand[i - 1]) * da;
            t_grid.push(acc * t_h);
        }
        (a_grid, t_grid)
    }
}

/// Piecewise-linear interpolation, clamping outside the grid.
///
/// `xs` must be strictly increasing.
pub fn interp_clamped(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if x.is_nan() || xs.is_empty() {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let hi = xs.partition_point(|&v| v < x);
    let lo = hi - 1;
    let frac = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + frac * (ys[hi] - ys[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIDUCIAL: Cosmology = Cosmology {
        omega_m: 0.31,
        omega_l: 0.69,
        hubble_param: 0.68,
    };

    #[test]
    fn test_hubble_time_magnitude() {
        // 1/H0 for h = 0.68 is about 14.4 Gyr.
        let t_h = FIDUCIAL.hubble_time_gyr();
        assert!((t_h - 14.38).abs() < 0.05, "t_h = {t_h}");
    }

    #[test]
    fn test_time_is_zero_at_grid_floor() {
        let t = FIDUCIAL.cosmic_time_gyr_scalar(1e-5);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_time_is_monotone_in_a() {
        let times = FIDUCIAL.cosmic_time_gyr(&[0.1, 0.3, 0.5, 0.8, 1.0]);
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0], "times not monotone: {times:?}");
        }
    }

    #[test]
    fn test_einstein_de_sitter_age() {
        // For Ωm = 1, ΩΛ = 0 the age at a = 1 is (2/3)·(1/H0).
        let eds = Cosmology {
            omega_m: 1.0,
            omega_l: 0.0,
            hubble_param: 0.7,
        };
        let age = eds.cosmic_time_gyr_scalar(1.0);
        let expected = 2.0 / 3.0 * eds.hubble_time_gyr();
        assert!(
            (age - expected).abs() / expected < 1e-3,
            "age = {age}, expected = {expected}"
        );
    }

    #[test]
    fn test_fiducial_age_near_planck_value() {
        // Ωm = 0.31, ΩΛ = 0.69, h = 0.68 gives roughly 13.8 Gyr today.
        let age = FIDUCIAL.cosmic_time_gyr_scalar(1.0);
        assert!((age - 13.8).abs() < 0.2, "age = {age}");
    }

    #[test]
    fn test_interp_clamps_and_interpolates() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 40.0];
        assert_eq!(interp_clamped(-1.0, &xs, &ys), 0.0);
        assert_eq!(interp_clamped(3.0, &xs, &ys), 40.0);
        assert_eq!(interp_clamped(0.5, &xs, &ys), 5.0);
        assert_eq!(interp_clamped(1.5, &xs, &ys), 25.0);
    }

    #[test]
    fn test_grid_endpoint_round_trip() {
        // Interpolating exactly at grid endpoints reproduces the grid values.
        let (a_grid, t_grid) = FIDUCIAL.time_grid(1.0);
        let t0 = interp_clamped(a_grid[0], &a_grid, &t_grid);
        let tn = interp_clamped(a_grid[a_grid.len() - 1], &a_grid, &t_grid);
        assert_eq!(t0, t_grid[0]);
        assert_eq!(tn, t_grid[t_grid.len() - 1]);
    }
}
