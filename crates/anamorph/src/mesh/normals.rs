//! Vertex normal fields from triangle data.

use nalgebra::Vector3;

use super::identity::VertexIdentity;
use crate::geometry::face_cross;

/// Per-vertex normals from triangles.
///
/// Each triangle contributes its unnormalized face normal `cross(b-a, c-a)`
/// (area weighted). Without `continuous` the contribution goes to the
/// triangle's own three indices, so duplicated seam vertices keep distinct
/// normals. With `continuous` it goes to every member of the identity groups
/// of `a`, `b`, `c` (once per vertex per triangle), which smooths across
/// seams. Vertices without any contribution keep a zero normal.
pub fn recalculate_normals(
    vertices: &[Vector3<f64>],
    triangles: &[[usize; 3]],
    identity: &VertexIdentity,
    continuous: bool,
) -> Vec<Vector3<f64>> {
    debug_assert_eq!(vertices.len(), identity.len(), "identity built for another mesh");
    let mut acc = vec![Vector3::zeros(); vertices.len()];
    let mut touched: Vec<usize> = Vec::with_capacity(16);
    for &[a, b, c] in triangles {
        let n = face_cross(vertices[a], vertices[b], vertices[c]);
        if !continuous {
            acc[a] += n;
            acc[b] += n;
            acc[c] += n;
            continue;
        }
        touched.clear();
        for v in [a, b, c] {
            touched.extend_from_slice(identity.group_of(v));
        }
        touched.sort_unstable();
        touched.dedup();
        for &v in &touched {
            acc[v] += n;
        }
    }
    for n in acc.iter_mut() {
        let len = n.norm();
        if len > 0.0 {
            *n /= len;
        }
    }
    acc
}

/// Unit face normal per triangle (zero for degenerate triangles).
pub fn face_normals(vertices: &[Vector3<f64>], triangles: &[[usize; 3]]) -> Vec<Vector3<f64>> {
    triangles
        .iter()
        .map(|&[a, b, c]| {
            let n = face_cross(vertices[a], vertices[b], vertices[c]);
            n.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
        })
        .collect()
}

/// Centroid per triangle.
pub fn triangle_centroids(
    vertices: &[Vector3<f64>],
    triangles: &[[usize; 3]],
) -> Vec<Vector3<f64>> {
    triangles
        .iter()
        .map(|&[a, b, c]| (vertices[a] + vertices[b] + vertices[c]) / 3.0)
        .collect()
}
