//! Reflection chains from a view point to every source vertex.
//!
//! For vertex `i` the first cast goes from the view point towards the vertex
//! and may only hit mirrors. Each further bounce is cast from the previous hit
//! along the previous outgoing direction and may hit any surface; a miss ends
//! the chain. When a bounce is appended, the previous bounce's direction is
//! rescaled to the length of the segment it spans, so only the final
//! direction stays unit length.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnamorphError, Result};
use crate::geometry::reflect;
use crate::raycast::{Raycaster, SurfaceFilter};

/// Hard upper bound on `TraceCfg::max_reflections`.
pub const MAX_REFLECTIONS_LIMIT: usize = 7;

/// Ray tracing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceCfg {
    pub max_raycast_distance: f64,
    pub max_reflections: usize,
}

impl Default for TraceCfg {
    fn default() -> Self {
        Self {
            max_raycast_distance: 20.0,
            max_reflections: 3,
        }
    }
}

impl TraceCfg {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_raycast_distance.is_finite() && self.max_raycast_distance > 0.0) {
            return Err(AnamorphError::invalid(format!(
                "max_raycast_distance must be finite and > 0, got {}",
                self.max_raycast_distance
            )));
        }
        if !(1..=MAX_REFLECTIONS_LIMIT).contains(&self.max_reflections) {
            return Err(AnamorphError::invalid(format!(
                "max_reflections must be within 1..={MAX_REFLECTIONS_LIMIT}, got {}",
                self.max_reflections
            )));
        }
        Ok(())
    }
}

/// One specular reflection event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounce {
    pub hit_point: Vector3<f64>,
    /// Unit surface normal at the hit.
    pub hit_normal: Vector3<f64>,
    /// Outgoing direction. Scaled to `segment_length` when a later bounce
    /// exists, unit length for the last bounce.
    pub direction: Vector3<f64>,
    /// Length of the segment to the next bounce; `None` for the last bounce.
    pub segment_length: Option<f64>,
}

/// Ordered bounces of one vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReflectionChain {
    bounces: Vec<Bounce>,
}

impl ReflectionChain {
    #[inline]
    pub fn bounces(&self) -> &[Bounce] {
        &self.bounces
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bounces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounces.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Bounce> {
        self.bounces.last()
    }

    #[inline]
    pub fn first(&self) -> Option<&Bounce> {
        self.bounces.first()
    }
}

/// Result of one tracing pass over all vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct Tracing {
    pub view_point: Vector3<f64>,
    /// Global source positions that were traced.
    pub vertices: Vec<Vector3<f64>>,
    /// Unnormalized initial directions (`vertex - view_point`).
    pub ray_directions: Vec<Vector3<f64>>,
    pub chains: Vec<ReflectionChain>,
    /// Distance from each vertex to its first mirror hit (0 on a miss).
    pub distance_from_mirror: Vec<f64>,
    pub max_reflections: usize,
}

impl Tracing {
    #[inline]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    #[inline]
    pub fn num_reflections(&self, i: usize) -> usize {
        self.chains[i].len()
    }

    #[inline]
    pub fn chain(&self, i: usize) -> &ReflectionChain {
        &self.chains[i]
    }

    /// True when every initial cast reached a mirror.
    pub fn all_hit(&self) -> bool {
        self.chains.iter().all(|c| !c.is_empty())
    }

    /// Vertices whose initial cast missed every mirror.
    pub fn missed(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.chains[i].is_empty()).collect()
    }

    /// Number of chains cut short of `max_reflections` after a first hit.
    pub fn truncated_count(&self) -> usize {
        self.chains
            .iter()
            .filter(|c| !c.is_empty() && c.len() < self.max_reflections)
            .count()
    }
}

/// Trace every vertex. Misses are recorded per vertex and reported once.
pub fn trace<R: Raycaster + ?Sized>(
    view_point: Vector3<f64>,
    vertices: &[Vector3<f64>],
    raycaster: &R,
    cfg: &TraceCfg,
) -> Result<Tracing> {
    cfg.validate()?;
    let mut ray_directions = Vec::with_capacity(vertices.len());
    let mut chains = Vec::with_capacity(vertices.len());
    let mut distance_from_mirror = vec![0.0; vertices.len()];
    for (i, &vertex) in vertices.iter().enumerate() {
        let ray = vertex - view_point;
        ray_directions.push(ray);
        let (chain, dist) = trace_vertex(view_point, ray, vertex, raycaster, cfg);
        distance_from_mirror[i] = dist;
        chains.push(chain);
    }
    let tracing = Tracing {
        view_point,
        vertices: vertices.to_vec(),
        ray_directions,
        chains,
        distance_from_mirror,
        max_reflections: cfg.max_reflections,
    };
    let missed = tracing.missed().len();
    if missed > 0 {
        warn!(
            missed,
            total = vertices.len(),
            "some initial raycasts did not hit a mirror; reposition the mirror or increase max_raycast_distance"
        );
    }
    debug!(
        vertices = vertices.len(),
        truncated = tracing.truncated_count(),
        "traced reflection chains"
    );
    Ok(tracing)
}

fn trace_vertex<R: Raycaster + ?Sized>(
    view_point: Vector3<f64>,
    ray: Vector3<f64>,
    vertex: Vector3<f64>,
    raycaster: &R,
    cfg: &TraceCfg,
) -> (ReflectionChain, f64) {
    let mut chain = ReflectionChain::default();
    let Some(direction) = ray.try_normalize(0.0) else {
        return (chain, 0.0);
    };
    let Some(first) = raycaster.raycast(
        view_point,
        direction,
        cfg.max_raycast_distance,
        SurfaceFilter::Mirrors,
    ) else {
        return (chain, 0.0);
    };
    let dist = (vertex - first.point).norm();
    chain.bounces.push(Bounce {
        hit_point: first.point,
        hit_normal: first.normal,
        direction: reflect(direction, first.normal),
        segment_length: None,
    });

    for _ in 1..cfg.max_reflections {
        let prev = chain.bounces[chain.bounces.len() - 1];
        let origin = prev.hit_point;
        let dir = prev.direction.normalize();
        let Some(hit) = raycaster.raycast(origin, dir, cfg.max_raycast_distance, SurfaceFilter::All)
        else {
            break;
        };
        let seg = (hit.point - origin).norm();
        if let Some(last) = chain.bounces.last_mut() {
            last.direction = dir * seg;
            last.segment_length = Some(seg);
        }
        chain.bounces.push(Bounce {
            hit_point: hit.point,
            hit_normal: hit.normal,
            direction: reflect(dir, hit.normal),
            segment_length: None,
        });
    }
    (chain, dist)
}
