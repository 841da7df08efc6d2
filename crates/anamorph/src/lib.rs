//! Anamorphic mirror mapping and normal-deviation optimization.
//!
//! Pipeline
//! - `tracer`: follow specular bounce chains from a view point to every source
//!   vertex through a `raycast::Raycaster`.
//! - `mapper`: place mapped vertices along the last bounce so the mesh, seen
//!   through the mirrors, reproduces the source silhouette.
//! - `optimize`: move mapped vertices along their rays to pull vertex normals
//!   towards an ideal normal field (planar, propagation, greedy, annealing).
//! - `experiment`: the same optimizers on a deformed source mesh without
//!   mirrors, with manual stepping and smoothing.
//!
//! Shared services live in `mesh` (identity groups, normal fields) and
//! `geometry` (intersection primitives).
//!
//! API Policy
//! - Types are plain owned buffers; each stage returns a new snapshot instead
//!   of mutating the previous one.
//! - Prefer the re-exports in `api` when wiring the pipeline from outside.

pub mod api;
pub mod error;
pub mod experiment;
pub mod geometry;
pub mod mapper;
pub mod mesh;
pub mod mirror;
pub mod optimize;
pub mod raycast;
pub mod tracer;

#[cfg(test)]
mod fixtures;

pub use error::{AnamorphError, Result};

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Short aliases used throughout the crate and by callers.
pub use nalgebra::{Vector2 as Vec2, Vector3 as Vec3};

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::experiment::{DeformMethod, ExperimentStatus, NormalExperiment, RunMode};
    pub use crate::mapper::{AnamorphicMapper, MapCfg, MapperCfg, MappingStatus};
    pub use crate::mesh::{MeshBuffers, MeshSink, SourceMesh, Transform};
    pub use crate::optimize::{OptimizeCfg, OptimizeMethod, RunReport};
    pub use crate::raycast::{Hit, Raycaster, Surface, SurfaceFilter, SurfaceKind, TriangleScene};
    pub use crate::tracer::TraceCfg;
    pub use crate::{AnamorphError, Result};
    pub use nalgebra::{Vector2 as Vec2, Vector3 as Vec3};
}
