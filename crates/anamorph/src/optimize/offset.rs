//! Depth offset: push every vertex back along its ray by how far it sits
//! behind the front-most source vertex (`z - min z`).

use nalgebra::Vector3;

use super::field::RayField;
use crate::error::{AnamorphError, Result};

pub fn depth_offset(field: &RayField, source_vertices: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
    if source_vertices.len() != field.len() {
        return Err(AnamorphError::LengthMismatch {
            expected: field.len(),
            actual: source_vertices.len(),
        });
    }
    let min_z = source_vertices
        .iter()
        .map(|v| v.z)
        .fold(f64::INFINITY, f64::min);
    Ok((0..field.len())
        .map(|i| field.position_at(i, field.distances[i] + (source_vertices[i].z - min_z)))
        .collect())
}
