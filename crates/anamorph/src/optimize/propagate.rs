//! Plane-intersection propagation from a seed triangle.
//!
//! Purpose
//! - Rebuild a mapped mesh whose triangles keep the relative orientation they
//!   had on the source: every target triangle normal is the seed's mapped
//!   normal rotated by the inverse of the source rotation from the seed to
//!   that triangle.
//!
//! Why this design
//! - Vertices only move along their final reflection rays, so placement is a
//!   line-plane intersection against a plane through an already placed
//!   neighbour. A FIFO queue of `(placed source vertex, triangle, target
//!   vertex)` spreads placements outwards from the seed like a BFS.
//! - The first placement of a vertex wins. Later disagreements beyond the
//!   tolerance are counted as conflicts, which keeps the result independent of
//!   how often a vertex is revisited.

use std::collections::VecDeque;

use nalgebra::{Unit, UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use super::cfg::PropagationCfg;
use crate::error::{AnamorphError, Result};
use crate::geometry::line_plane_intersection;
use crate::mesh::{face_normals, vertex_triangles, VertexIdentity};
use crate::tracer::Tracing;

#[derive(Clone, Debug, PartialEq)]
pub struct PropagationOutcome {
    pub positions: Vec<Vector3<f64>>,
    pub seed_triangle: usize,
    pub iterations: usize,
    /// Queue was non-empty when the iteration ceiling was reached.
    pub hit_ceiling: bool,
    /// Revisits that disagreed with the existing placement.
    pub conflicts: usize,
    /// Vertices with at least one conflicting revisit, ascending.
    pub conflicted: Vec<usize>,
    /// Queue iteration that placed each vertex (`Some(0)` for the seed).
    pub placed_at: Vec<Option<usize>>,
    /// Mapped vertices the propagation never reached (kept at the mapped position).
    pub unplaced: usize,
}

/// Inputs shared by the propagation passes.
pub struct PropagationInput<'a> {
    pub tracing: &'a Tracing,
    /// Global source positions and source-winding triangles.
    pub source_vertices: &'a [Vector3<f64>],
    pub triangles: &'a [[usize; 3]],
    /// Mapped positions and the triangles they are rendered with.
    pub mapped: &'a [Vector3<f64>],
    pub mapped_triangles: &'a [[usize; 3]],
    pub identity: &'a VertexIdentity,
    pub continuous: bool,
}

/// Rotation taking `from` onto `to`; antiparallel inputs rotate by π about an
/// axis perpendicular to `from`, zero inputs give the identity.
fn rotation_from_to(from: Vector3<f64>, to: Vector3<f64>) -> UnitQuaternion<f64> {
    if from.norm_squared() == 0.0 || to.norm_squared() == 0.0 {
        return UnitQuaternion::identity();
    }
    if let Some(q) = UnitQuaternion::rotation_between(&from, &to) {
        return q;
    }
    let helper = if from.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let axis = Unit::new_normalize(from.cross(&helper));
    UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI)
}

/// Target normal per triangle, relative to the seed triangle.
pub fn target_normals(
    source_normals: &[Vector3<f64>],
    mapped_normals: &[Vector3<f64>],
    seed: usize,
) -> Vec<Vector3<f64>> {
    source_normals
        .iter()
        .map(|&n| rotation_from_to(n, source_normals[seed]) * mapped_normals[seed])
        .collect()
}

pub fn propagate(input: &PropagationInput<'_>, cfg: &PropagationCfg) -> Result<PropagationOutcome> {
    if !input.continuous {
        return Err(AnamorphError::DiscontinuousMesh);
    }
    let n = input.tracing.len();
    for len in [input.source_vertices.len(), input.mapped.len(), input.identity.len()] {
        if len != n {
            return Err(AnamorphError::LengthMismatch {
                expected: n,
                actual: len,
            });
        }
    }
    if input.mapped_triangles.len() != input.triangles.len() {
        return Err(AnamorphError::LengthMismatch {
            expected: input.triangles.len(),
            actual: input.mapped_triangles.len(),
        });
    }
    let triangles = input.triangles;
    let tracing = input.tracing;
    let mapped_normals = face_normals(input.mapped, input.mapped_triangles);
    let source_normals = face_normals(input.source_vertices, triangles);

    let seed_axis = Vector3::from(cfg.seed_axis);
    let mut seed = None;
    let mut best = f64::NEG_INFINITY;
    for (k, tri) in triangles.iter().enumerate() {
        if tri.iter().any(|&v| tracing.chain(v).is_empty()) {
            continue;
        }
        let score = mapped_normals[k].dot(&seed_axis);
        if score > best {
            best = score;
            seed = Some(k);
        }
    }
    let seed = seed.ok_or(AnamorphError::MissingSeed)?;
    debug!(seed, "propagation seed triangle");

    let targets = target_normals(&source_normals, &mapped_normals, seed);
    let incident = vertex_triangles(triangles, n);

    let mut placed = vec![0usize; n];
    let mut placed_at = vec![None; n];
    let mut conflicted = vec![false; n];
    let mut positions = vec![Vector3::zeros(); n];
    let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();
    let enqueue = |queue: &mut VecDeque<(usize, usize, usize)>, from: usize, skip_tri: usize| {
        for &vt in &incident[from] {
            if vt == skip_tri {
                continue;
            }
            for w in triangles[vt] {
                if w != from {
                    queue.push_back((from, vt, w));
                }
            }
        }
    };
    for v in triangles[seed] {
        positions[v] = input.mapped[v];
        placed[v] += 1;
        placed_at[v] = Some(0);
        enqueue(&mut queue, v, seed);
    }

    let mut iterations = 0usize;
    let mut conflicts = 0usize;
    let mut no_ray = 0usize;
    while iterations < cfg.max_iterations {
        let Some((sv, t, v)) = queue.pop_front() else {
            break;
        };
        iterations += 1;
        let Some(last) = tracing.chain(v).last() else {
            no_ray += 1;
            continue;
        };
        let Some(ix) =
            line_plane_intersection(last.hit_point, last.direction, targets[t], positions[sv])
        else {
            continue;
        };
        if placed[v] > 0 {
            if (ix - positions[v]).norm_squared() >= cfg.tolerance_sq {
                conflicts += 1;
                conflicted[v] = true;
            }
            continue;
        }
        for &vi in input.identity.group_of(v) {
            positions[vi] = ix;
            placed[vi] += 1;
            placed_at[vi] = Some(iterations);
            enqueue(&mut queue, vi, t);
        }
    }
    let hit_ceiling = !queue.is_empty();
    if hit_ceiling {
        warn!(
            iterations,
            pending = queue.len(),
            "propagation stopped at the iteration ceiling; using partial placement"
        );
    }
    if conflicts > 0 {
        warn!(conflicts, "propagation revisits disagreed with the first placement");
    }
    if no_ray > 0 {
        warn!(no_ray, "propagation reached vertices without reflections");
    }

    let mut unplaced = 0usize;
    for v in 0..n {
        if placed[v] == 0 {
            positions[v] = input.mapped[v];
            if !tracing.chain(v).is_empty() {
                unplaced += 1;
            }
        }
    }
    if unplaced > 0 {
        warn!(unplaced, "vertices not reached by propagation keep their mapped position");
    }
    info!(seed, iterations, conflicts, unplaced, "triangle propagation done");
    Ok(PropagationOutcome {
        positions,
        seed_triangle: seed,
        iterations,
        hit_ceiling,
        conflicts,
        conflicted: (0..n).filter(|&v| conflicted[v]).collect(),
        placed_at,
        unplaced,
    })
}
