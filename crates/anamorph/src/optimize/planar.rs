//! Closed-form correction in a single reference plane.
//!
//! Works for flat source meshes seen through a mirror curved in one direction
//! only. The vertex whose projected final reflection coincides with the
//! projected mirror normal (in-plane incidence angle exactly zero) is the
//! central vertex and stays put. Every other vertex is slid along its final
//! reflection ray to the point where that ray crosses the line from the mapped
//! central vertex in the direction the vertex had relative to the central
//! vertex on the source.

use nalgebra::Vector3;
use tracing::{debug, warn};

use super::cfg::PlanarCfg;
use crate::error::{AnamorphError, Result};
use crate::geometry::{angle_deg_2d, line_line_intersection, signed_angle_deg_2d, unit_from_deg};
use crate::tracer::Tracing;

#[derive(Clone, Debug, PartialEq)]
pub struct PlanarOutcome {
    pub positions: Vec<Vector3<f64>>,
    pub central: usize,
    /// Vertices that fell back to their mapped position.
    pub fallbacks: usize,
    /// Vertices placed with a gamma outside the configured range.
    pub abnormal: usize,
}

/// Planar correction of `mapped` (one position per traced vertex).
///
/// `local_vertices` are the source vertices in object space; their in-plane
/// layout relative to the central vertex defines the target directions.
pub fn planar_correction(
    tracing: &Tracing,
    local_vertices: &[Vector3<f64>],
    mapped: &[Vector3<f64>],
    reference_angle_deg: f64,
    cfg: &PlanarCfg,
) -> Result<PlanarOutcome> {
    let n = tracing.len();
    for len in [local_vertices.len(), mapped.len()] {
        if len != n {
            return Err(AnamorphError::LengthMismatch {
                expected: n,
                actual: len,
            });
        }
    }
    let plane = cfg.plane;

    let mut min_angle = f64::INFINITY;
    let mut central = None;
    for i in 0..n {
        let Some(last) = tracing.chain(i).last() else {
            continue;
        };
        let a = angle_deg_2d(plane.project(last.direction), plane.project(last.hit_normal));
        if a < min_angle {
            min_angle = a;
            central = Some(i);
        }
    }
    let central = match central {
        Some(c) if min_angle == 0.0 => c,
        _ => return Err(AnamorphError::NoPlanarSolution { min_angle }),
    };
    debug!(central, "planar correction central vertex");

    let reference = unit_from_deg(reference_angle_deg);
    let central_src = plane.project(local_vertices[central]);
    let central_mapped = plane.project(mapped[central]);
    let (g_lo, g_hi) = cfg.gamma_warn_range;

    let mut positions = mapped.to_vec();
    let mut fallbacks = 0usize;
    let mut abnormal = 0usize;
    for i in 0..n {
        if i == central {
            continue;
        }
        let Some(last) = tracing.chain(i).last() else {
            continue;
        };
        let angle = signed_angle_deg_2d(reference, plane.project(local_vertices[i]) - central_src);
        let search = unit_from_deg(-angle);
        let hit = plane.project(last.hit_point);
        let refl = plane.project(last.direction);
        let Some(ix) = line_line_intersection(hit, refl, central_mapped, search) else {
            warn!(vertex = i, "planar correction: no intersection, keeping mapped position");
            fallbacks += 1;
            continue;
        };
        let gamma = (ix.x - hit.x) / refl.x;
        if gamma.is_nan() {
            warn!(
                vertex = i,
                numerator = ix.x - hit.x,
                denominator = refl.x,
                "planar correction: undefined gamma, keeping mapped position"
            );
            fallbacks += 1;
            continue;
        }
        positions[i] = last.hit_point + last.direction * gamma;
        if gamma > g_hi || gamma < g_lo {
            warn!(vertex = i, gamma, "planar correction: abnormal gamma");
            abnormal += 1;
        }
    }
    Ok(PlanarOutcome {
        positions,
        central,
        fallbacks,
        abnormal,
    })
}
