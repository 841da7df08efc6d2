//! Angular deviation between normal fields.

use nalgebra::Vector3;

use crate::error::{AnamorphError, Result};
use crate::geometry::angle_deg;

/// Per-vertex angle (degrees, `[0, 180]`) between `target[i]` and `current[i]`.
pub fn angular_deviation(target: &[Vector3<f64>], current: &[Vector3<f64>]) -> Result<Vec<f64>> {
    if target.len() != current.len() {
        return Err(AnamorphError::LengthMismatch {
            expected: target.len(),
            actual: current.len(),
        });
    }
    Ok(target
        .iter()
        .zip(current)
        .map(|(&t, &c)| angle_deg(t, c))
        .collect())
}

/// Sum of per-vertex deviations.
#[inline]
pub fn total_deviation(deviations: &[f64]) -> f64 {
    deviations.iter().sum()
}

/// Reflect every normal across the plane with unit normal `axis`.
pub fn mirrored_normals(normals: &[Vector3<f64>], axis: Vector3<f64>) -> Vec<Vector3<f64>> {
    normals
        .iter()
        .map(|&n| n - axis * (2.0 * n.dot(&axis)))
        .collect()
}
