//! Curated API for the CLI and experiment drivers (UNSTABLE).
//!
//! Important
//! - A convenience surface, not a stability promise. Re-exports move when the
//!   modules behind them move.
//! - Prefer these paths over reaching into submodules from outside the crate.

// Geometry primitives
pub use crate::geometry::{
    angle_deg, line_line_intersection, line_plane_intersection, reflect, ReferencePlane,
};
// Meshes and identity groups
pub use crate::mesh::{
    face_normals, recalculate_normals, reverse_winding, MeshBuffers, MeshSink, SourceMesh,
    Transform, VertexIdentity, IDENTITY_EPS,
};
// Scene and mirrors
pub use crate::mirror::{curved_square, flat_quad, CurveDirection};
pub use crate::raycast::{Hit, Raycaster, Surface, SurfaceFilter, SurfaceKind, TriangleScene};
// Reflection tracing and mapping
pub use crate::mapper::{
    map_vertices, optimize_scene, AnamorphicMapper, MapCfg, MappedMesh, MappedScene, MapperCfg,
    MappingStatus, OptimizeDetail, OptimizedMesh,
};
pub use crate::tracer::{trace, Bounce, ReflectionChain, TraceCfg, Tracing};
// Normal-deviation optimization
pub use crate::optimize::{
    angular_deviation, total_deviation, AnnealCfg, CoolingCurve, FinishReason, GreedyCfg,
    OptimizeCfg, OptimizeMethod, OptimizerRun, PlanarCfg, PropagationCfg, RayField, RayMesh,
    RunReport, RunSummary, StepResult, Trial, TrialLog, VertexPick,
};
// Deform-then-optimize experiments
pub use crate::experiment::{
    DeformMethod, ExperimentStatus, NormalExperiment, RunMode, SmoothCfg,
};
