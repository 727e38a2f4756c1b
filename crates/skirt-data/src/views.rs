//! Camera view records and the `views.json` payload.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::DataError;

/// A single camera viewpoint on the unit sphere.
///
/// `theta_deg` is the polar angle from the +z axis, `phi_deg` the azimuth
/// from the +x axis; `dir` is the matching unit direction vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub index: usize,
    pub theta_deg: f64,
    pub phi_deg: f64,
    pub dir: [f64; 3],
}

impl View {
    /// Builds a view from a unit direction vector.
    pub fn from_direction(index: usize, dir: [f64; 3]) -> Self {
        let cos_theta = dir[2].clamp(-1.0, 1.0);
        Self {
            index,
            theta_deg: cos_theta.acos().to_degrees(),
            phi_deg: dir[1].atan2(dir[0]).to_degrees(),
            dir,
        }
    }
}

/// The full view list written by the `views` stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSet {
    pub num_views: usize,
    pub method: String,
    pub created_utc: String,
    pub views: Vec<View>,
}

impl ViewSet {
    /// Loads a view set from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| DataError::json(path, e))
    }

    /// Writes the view set as pretty-printed JSON.
    pub fn to_file(&self, path: &Path) -> Result<(), DataError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| DataError::json(path, e))?;
        fs::write(path, content).map_err(|e| DataError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_view_from_direction_poles() {
        let up = View::from_direction(0, [0.0, 0.0, 1.0]);
        assert!(up.theta_deg.abs() < 1e-12);

        let down = View::from_direction(1, [0.0, 0.0, -1.0]);
        assert!((down.theta_deg - 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_view_from_direction_equator() {
        let v = View::from_direction(0, [0.0, 1.0, 0.0]);
        assert!((v.theta_deg - 90.0).abs() < 1e-12);
        assert!((v.phi_deg - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_view_set_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.json");

        let set = ViewSet {
            num_views: 1,
            method: "fibonacci_sphere".to_string(),
            created_utc: "2026-01-01T00:00:00Z".to_string(),
            views: vec![View::from_direction(0, [1.0, 0.0, 0.0])],
        };
        set.to_file(&path).unwrap();

        let loaded = ViewSet::from_file(&path).unwrap();
        assert_eq!(loaded.num_views, 1);
        assert_eq!(loaded.views[0].index, 0);
        assert_eq!(loaded.views[0].dir, [1.0, 0.0, 0.0]);
    }
}
