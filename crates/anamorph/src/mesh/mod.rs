//! Owned mesh buffers, source meshes with world transforms, and the shared
//! identity/normal services.
//!
//! Conventions
//! - Triangles are `[usize; 3]` index triples; a face normal is
//!   `cross(b - a, c - a)`.
//! - Every per-vertex array of a mesh has the same length.
//! - Mapped meshes use the reverse winding of their source (`[c, b, a]`) to
//!   undo the handedness flip of a reflection.

pub mod identity;
pub mod normals;

pub use identity::{VertexIdentity, IDENTITY_EPS};
pub use normals::{face_normals, recalculate_normals, triangle_centroids};

use nalgebra::{UnitQuaternion, Vector2, Vector3};

use crate::error::{AnamorphError, Result};

/// Rigid placement plus per-axis scale (`p ↦ R (s ⊙ p) + t`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[inline]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }

    /// Translation only.
    #[inline]
    pub fn from_translation(t: Vector3<f64>) -> Self {
        Self {
            translation: t,
            ..Self::identity()
        }
    }

    /// Build from Euler angles in degrees (roll about x, pitch about y, yaw about z).
    pub fn from_euler_deg(
        translation: Vector3<f64>,
        euler_deg: Vector3<f64>,
        scale: Vector3<f64>,
    ) -> Self {
        Self {
            translation,
            rotation: UnitQuaternion::from_euler_angles(
                euler_deg.x.to_radians(),
                euler_deg.y.to_radians(),
                euler_deg.z.to_radians(),
            ),
            scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vector3<f64>) -> Vector3<f64> {
        self.rotation * p.component_mul(&self.scale) + self.translation
    }

    /// Rotate a direction; scale is ignored (normals stay unit length).
    #[inline]
    pub fn rotate(&self, v: Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Map a local surface normal to world space with the inverse-transpose
    /// of the linear part, renormalized. Degenerate scales fall back to the
    /// rotation alone.
    pub fn transform_normal(&self, n: Vector3<f64>) -> Vector3<f64> {
        if self.scale.iter().any(|&c| c == 0.0) {
            return self.rotate(n);
        }
        let m = self.rotation * n.component_div(&self.scale);
        let len = m.norm();
        if len == 0.0 || !len.is_finite() {
            return self.rotate(n);
        }
        m / len
    }

    /// Signed rotation angle about `axis` (unit), in degrees. Only the
    /// component of the rotation axis along `axis` contributes.
    pub fn angle_about_deg(&self, axis: Vector3<f64>) -> f64 {
        match self.rotation.axis_angle() {
            Some((ax, angle)) => ax.dot(&axis) * angle.to_degrees(),
            None => 0.0,
        }
    }
}

/// Source mesh as provided by the host scene.
#[derive(Clone, Debug, Default)]
pub struct SourceMesh {
    pub name: String,
    /// Local-space positions.
    pub vertices: Vec<Vector3<f64>>,
    pub triangles: Vec<[usize; 3]>,
    pub uvs: Vec<Vector2<f64>>,
    /// Local-space vertex normals; recomputed from geometry when absent.
    pub normals: Option<Vec<Vector3<f64>>>,
    pub transform: Transform,
    /// Seam duplicates share normals (see `normals::recalculate_normals`).
    pub continuous: bool,
}

impl SourceMesh {
    /// Check index ranges and per-vertex array lengths.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if n == 0 {
            return Err(AnamorphError::invalid("source mesh has no vertices"));
        }
        if let Some((k, t)) = self
            .triangles
            .iter()
            .enumerate()
            .find(|(_, t)| t.iter().any(|&i| i >= n))
        {
            return Err(AnamorphError::invalid(format!(
                "triangle {k} {t:?} references a vertex outside 0..{n}"
            )));
        }
        if !self.uvs.is_empty() && self.uvs.len() != n {
            return Err(AnamorphError::LengthMismatch {
                expected: n,
                actual: self.uvs.len(),
            });
        }
        if let Some(normals) = &self.normals {
            if normals.len() != n {
                return Err(AnamorphError::LengthMismatch {
                    expected: n,
                    actual: normals.len(),
                });
            }
        }
        Ok(())
    }

    pub fn global_vertices(&self) -> Vec<Vector3<f64>> {
        self.vertices
            .iter()
            .map(|&v| self.transform.transform_point(v))
            .collect()
    }

    /// World-space vertex normals (stored normals, or recomputed in local
    /// space with the mesh's continuity flag, then mapped by the transform).
    pub fn global_normals(&self) -> Vec<Vector3<f64>> {
        let local = match &self.normals {
            Some(n) => n.clone(),
            None => {
                let identity = VertexIdentity::build(&self.vertices, IDENTITY_EPS);
                recalculate_normals(&self.vertices, &self.triangles, &identity, self.continuous)
            }
        };
        local
            .into_iter()
            .map(|n| self.transform.transform_normal(n))
            .collect()
    }

    /// UV0, padded with zeros when the source carries none.
    pub fn uv0(&self) -> Vec<Vector2<f64>> {
        if self.uvs.is_empty() {
            vec![Vector2::zeros(); self.vertices.len()]
        } else {
            self.uvs.clone()
        }
    }
}

/// Renderable mesh snapshot handed to a `MeshSink`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffers {
    pub vertices: Vec<Vector3<f64>>,
    pub triangles: Vec<[usize; 3]>,
    pub uv0: Vec<Vector2<f64>>,
    /// Side channel with the source normals, for shading comparisons.
    pub source_normals: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
}

/// Consumer of finished meshes (renderer, collision proxy, file writer).
pub trait MeshSink {
    fn accept(&mut self, name: &str, mesh: &MeshBuffers);
}

/// Triangles incident to each vertex, ascending and without duplicates.
pub fn vertex_triangles(triangles: &[[usize; 3]], vertex_count: usize) -> Vec<Vec<usize>> {
    let mut map: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    for (k, tri) in triangles.iter().enumerate() {
        for &v in tri {
            if map[v].last() != Some(&k) {
                map[v].push(k);
            }
        }
    }
    map
}

/// Reverse the winding of every triangle (`[a, b, c]` → `[c, b, a]`).
pub fn reverse_winding(triangles: &[[usize; 3]]) -> Vec<[usize; 3]> {
    triangles.iter().map(|&[a, b, c]| [c, b, a]).collect()
}
