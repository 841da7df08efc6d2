//! Normal-deviation optimization.
//!
//! Purpose
//! - Move mapped vertices along their final reflection rays so the mesh's
//!   vertex normals approach an ideal normal field, without changing what the
//!   viewer sees through the mirror.
//!
//! Why this design
//! - Strategies share one vertex parameterization (`field::RayField`) and one
//!   mutable mesh (`field::RayMesh`) with explicit propose/commit, so every
//!   accepted change is a single write of a whole identity group.
//! - The closed-form passes (`planar`, `propagate`, `offset`) are plain
//!   functions returning new positions. The iterative ones (`greedy`,
//!   `anneal`) are explicit state machines driven by `step::OptimizerRun`.
//! - Every strategy is a local heuristic; none guarantees a global optimum.

pub mod anneal;
pub mod cfg;
pub mod deviation;
pub mod field;
pub mod greedy;
pub mod offset;
pub mod planar;
pub mod propagate;
pub mod report;
pub mod step;

pub use cfg::{
    AnnealCfg, CoolingCurve, GreedyCfg, OptimizeCfg, OptimizeMethod, PlanarCfg, PropagationCfg,
    VertexPick,
};
pub use deviation::{angular_deviation, mirrored_normals, total_deviation};
pub use field::{Candidate, RayField, RayMesh};
pub use offset::depth_offset;
pub use planar::{planar_correction, PlanarOutcome};
pub use propagate::{propagate, PropagationInput, PropagationOutcome};
pub use report::{RunReport, Trial, TrialLog};
pub use step::{FinishReason, OptimizerRun, RunSummary, StepResult};

#[cfg(test)]
mod tests;
