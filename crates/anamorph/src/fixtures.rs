//! Shared scenes for unit tests.

use nalgebra::{vector, Vector2, Vector3};

use crate::mesh::{SourceMesh, Transform};
use crate::mirror::flat_quad;
use crate::raycast::TriangleScene;

/// `n × n` grid spanning `[-half, half]²` in the local xy-plane, placed at
/// depth `z` and facing the origin (`-z`).
pub fn grid_source(n: usize, half: f64, z: f64) -> SourceMesh {
    let mut vertices = Vec::with_capacity(n * n);
    let mut uvs = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let u = i as f64 / (n - 1) as f64;
            let v = j as f64 / (n - 1) as f64;
            vertices.push(vector![(2.0 * u - 1.0) * half, (2.0 * v - 1.0) * half, 0.0]);
            uvs.push(Vector2::new(u, v));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            let b = a + 1;
            let c = a + n;
            let d = c + 1;
            triangles.push([a, c, b]);
            triangles.push([b, c, d]);
        }
    }
    SourceMesh {
        name: "grid".into(),
        vertices,
        triangles,
        uvs,
        normals: None,
        transform: Transform::from_translation(vector![0.0, 0.0, z]),
        continuous: true,
    }
}

/// Large flat mirror at depth `z` facing the origin.
pub fn flat_mirror(z: f64) -> TriangleScene {
    TriangleScene::new()
        .with_surface(flat_quad(20.0, 20.0).transformed(&Transform::from_translation(vector![0.0, 0.0, z])))
}

pub fn origin() -> Vector3<f64> {
    Vector3::zeros()
}
