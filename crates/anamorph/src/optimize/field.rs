//! Along-ray vertex parameterization and the mutable mesh the iterative
//! strategies work on.
//!
//! Vertex `i` sits at `origins[i] + s_i · directions[i]` with
//! `s_i = max(scale · distances[i], floor)`. Optimizers only change
//! `distances`, so every vertex stays on its ray and the silhouette seen from
//! the view point is preserved.

use nalgebra::Vector3;

use super::deviation::{angular_deviation, total_deviation};
use crate::error::{AnamorphError, Result};
use crate::mesh::{recalculate_normals, VertexIdentity};
use crate::tracer::Tracing;

#[derive(Clone, Debug, PartialEq)]
pub struct RayField {
    pub origins: Vec<Vector3<f64>>,
    pub directions: Vec<Vector3<f64>>,
    pub distances: Vec<f64>,
    pub scale: f64,
    /// Lower bound on `scale · distance`.
    pub floor: f64,
    /// Vertices without a ray stay at the origin of the frame.
    pub valid: Vec<bool>,
}

impl RayField {
    /// Rays along the final bounce of every chain; the distance is the
    /// vertex's distance to its first mirror hit.
    pub fn from_tracing(tracing: &Tracing, scale: f64, floor: f64) -> Self {
        let n = tracing.len();
        let mut origins = vec![Vector3::zeros(); n];
        let mut directions = vec![Vector3::zeros(); n];
        let mut valid = vec![false; n];
        for i in 0..n {
            if let Some(last) = tracing.chain(i).last() {
                origins[i] = last.hit_point;
                directions[i] = last.direction;
                valid[i] = true;
            }
        }
        Self {
            origins,
            directions,
            distances: tracing.distance_from_mirror.clone(),
            scale,
            floor,
            valid,
        }
    }

    /// Rays from a view point through each vertex (unit directions, distances
    /// equal to the current vertex distance).
    pub fn from_view(view_point: Vector3<f64>, vertices: &[Vector3<f64>]) -> Self {
        let n = vertices.len();
        let mut directions = Vec::with_capacity(n);
        let mut distances = Vec::with_capacity(n);
        let mut valid = Vec::with_capacity(n);
        for &v in vertices {
            let ray = v - view_point;
            let len = ray.norm();
            match ray.try_normalize(0.0) {
                Some(d) => {
                    directions.push(d);
                    valid.push(true);
                }
                None => {
                    directions.push(Vector3::zeros());
                    valid.push(false);
                }
            }
            distances.push(len);
        }
        Self {
            origins: vec![view_point; n],
            directions,
            distances,
            scale: 1.0,
            floor: 0.0,
            valid,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    #[inline]
    pub fn position_at(&self, i: usize, distance: f64) -> Vector3<f64> {
        if !self.valid[i] {
            return Vector3::zeros();
        }
        let s = (self.scale * distance).max(self.floor);
        self.origins[i] + self.directions[i] * s
    }

    #[inline]
    pub fn position(&self, i: usize) -> Vector3<f64> {
        self.position_at(i, self.distances[i])
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        (0..self.len()).map(|i| self.position(i)).collect()
    }
}

/// Proposed group move, computed against the current committed state.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub vertex: usize,
    pub distance: f64,
    pub positions: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub deviations: Vec<f64>,
    pub total: f64,
}

/// Mesh state shared by the iterative optimizers.
///
/// Reads happen against the committed buffers; `propose` builds a full
/// candidate (positions, normals, deviations) and `commit` swaps it in.
#[derive(Clone, Debug)]
pub struct RayMesh {
    field: RayField,
    triangles: Vec<[usize; 3]>,
    identity: VertexIdentity,
    continuous: bool,
    ideal_normals: Vec<Vector3<f64>>,
    positions: Vec<Vector3<f64>>,
    normals: Vec<Vector3<f64>>,
    deviations: Vec<f64>,
    total: f64,
}

impl RayMesh {
    pub fn new(
        field: RayField,
        triangles: Vec<[usize; 3]>,
        identity: VertexIdentity,
        continuous: bool,
        ideal_normals: Vec<Vector3<f64>>,
    ) -> Result<Self> {
        let n = field.len();
        for len in [
            field.directions.len(),
            field.distances.len(),
            field.valid.len(),
            identity.len(),
            ideal_normals.len(),
        ] {
            if len != n {
                return Err(AnamorphError::LengthMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }
        if triangles.iter().flatten().any(|&i| i >= n) {
            return Err(AnamorphError::invalid("triangle index out of range"));
        }
        let positions = field.positions();
        let normals = recalculate_normals(&positions, &triangles, &identity, continuous);
        let deviations = angular_deviation(&ideal_normals, &normals)?;
        let total = total_deviation(&deviations);
        Ok(Self {
            field,
            triangles,
            identity,
            continuous,
            ideal_normals,
            positions,
            normals,
            deviations,
            total,
        })
    }

    /// Move the identity group of `vertex` to `distance` along its rays and
    /// evaluate the whole mesh. Nothing is committed.
    pub fn propose(&self, vertex: usize, distance: f64) -> Candidate {
        let mut positions = self.positions.clone();
        for &v in self.identity.group_of(vertex) {
            positions[v] = self.field.position_at(v, distance);
        }
        // Full recomputation; a local update around the group would be cheaper.
        let normals =
            recalculate_normals(&positions, &self.triangles, &self.identity, self.continuous);
        let deviations: Vec<f64> = self
            .ideal_normals
            .iter()
            .zip(&normals)
            .map(|(&t, &c)| crate::geometry::angle_deg(t, c))
            .collect();
        let total = total_deviation(&deviations);
        Candidate {
            vertex,
            distance,
            positions,
            normals,
            deviations,
            total,
        }
    }

    pub fn commit(&mut self, c: Candidate) {
        for &v in self.identity.group_of(c.vertex) {
            self.field.distances[v] = c.distance;
        }
        self.positions = c.positions;
        self.normals = c.normals;
        self.deviations = c.deviations;
        self.total = c.total;
    }

    /// Replace all distances at once (deformations, smoothing).
    pub fn set_distances(&mut self, distances: Vec<f64>) -> Result<()> {
        if distances.len() != self.field.len() {
            return Err(AnamorphError::LengthMismatch {
                expected: self.field.len(),
                actual: distances.len(),
            });
        }
        self.field.distances = distances;
        self.positions = self.field.positions();
        self.normals = recalculate_normals(
            &self.positions,
            &self.triangles,
            &self.identity,
            self.continuous,
        );
        self.deviations = angular_deviation(&self.ideal_normals, &self.normals)?;
        self.total = total_deviation(&self.deviations);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.field.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.total
    }

    #[inline]
    pub fn deviations(&self) -> &[f64] {
        &self.deviations
    }

    #[inline]
    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    #[inline]
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    #[inline]
    pub fn field(&self) -> &RayField {
        &self.field
    }

    #[inline]
    pub fn distance(&self, i: usize) -> f64 {
        self.field.distances[i]
    }

    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        self.field.valid[i]
    }

    #[inline]
    pub fn identity(&self) -> &VertexIdentity {
        &self.identity
    }

    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    #[inline]
    pub fn ideal_normals(&self) -> &[Vector3<f64>] {
        &self.ideal_normals
    }
}
