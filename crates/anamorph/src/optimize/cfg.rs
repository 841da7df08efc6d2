//! Optimizer configuration (strategy selector plus per-strategy knobs).
//!
//! All structs deserialize with defaults for missing fields so scene files
//! only name what they change.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{AnamorphError, Result};
use crate::geometry::ReferencePlane;

/// Interchangeable optimization strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeMethod {
    /// Closed-form correction in one reference plane.
    Planar,
    /// Plane-intersection propagation from a seed triangle.
    TrianglePropagation,
    /// Largest-deviation-first hill climbing.
    #[default]
    Greedy,
    /// Simulated annealing.
    Anneal,
    /// Push vertices back by their depth behind the front-most vertex.
    DepthOffset,
}

impl OptimizeMethod {
    pub fn name(self) -> &'static str {
        match self {
            OptimizeMethod::Planar => "planar",
            OptimizeMethod::TrianglePropagation => "triangle_propagation",
            OptimizeMethod::Greedy => "greedy",
            OptimizeMethod::Anneal => "anneal",
            OptimizeMethod::DepthOffset => "depth_offset",
        }
    }

    /// Strategies driven one iteration at a time by `OptimizerRun`.
    pub fn is_iterative(self) -> bool {
        matches!(self, OptimizeMethod::Greedy | OptimizeMethod::Anneal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarCfg {
    pub plane: ReferencePlane,
    /// Reference direction in the plane, degrees from the plane's first axis.
    /// `None` derives it from the source transform's rotation about the
    /// plane normal.
    pub reference_angle_deg: Option<f64>,
    /// Gamma values outside this range are reported as abnormal.
    pub gamma_warn_range: (f64, f64),
}

impl Default for PlanarCfg {
    fn default() -> Self {
        Self {
            plane: ReferencePlane::XZ,
            reference_angle_deg: None,
            gamma_warn_range: (0.4, 3.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationCfg {
    /// The seed triangle is the one whose mapped normal best aligns with this axis.
    pub seed_axis: [f64; 3],
    /// Revisits closer than this (squared distance) count as agreement.
    pub tolerance_sq: f64,
    /// Hard ceiling on processed queue entries.
    pub max_iterations: usize,
}

impl Default for PropagationCfg {
    fn default() -> Self {
        Self {
            seed_axis: [0.0, 0.0, 1.0],
            tolerance_sq: 0.005,
            max_iterations: 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyCfg {
    /// Relative along-ray perturbation per proposal.
    pub step_fraction: f64,
    /// Vertices with a smaller deviation (degrees) are not worth moving.
    pub negligible_deg: f64,
}

impl Default for GreedyCfg {
    fn default() -> Self {
        Self {
            step_fraction: 0.01,
            negligible_deg: 0.2,
        }
    }
}

/// Shape of the cooling schedule; maps `[0, 1] → [0, 1]` monotonically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoolingCurve {
    #[default]
    Linear,
    Quadratic,
    Cubic,
    Exponential,
    Cosine,
}

impl CoolingCurve {
    pub fn eval(self, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        match self {
            CoolingCurve::Linear => u,
            CoolingCurve::Quadratic => u * u,
            CoolingCurve::Cubic => u * u * u,
            CoolingCurve::Exponential => {
                const K: f64 = 5.0;
                ((K * u).exp() - 1.0) / (K.exp() - 1.0)
            }
            CoolingCurve::Cosine => 0.5 * (1.0 - (std::f64::consts::PI * u).cos()),
        }
    }
}

/// How annealing chooses the vertex to perturb.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexPick {
    #[default]
    Uniform,
    LargestDeviation,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealCfg {
    /// Offsets are drawn from `[-offset_range, offset_range]` ...
    pub offset_range: f64,
    /// ... in multiples of `offset_step` (never zero).
    pub offset_step: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub curve: CoolingCurve,
    pub pick: VertexPick,
}

impl Default for AnnealCfg {
    fn default() -> Self {
        Self {
            offset_range: 0.05,
            offset_step: 0.005,
            t_min: 0.01,
            t_max: 5.0,
            curve: CoolingCurve::Linear,
            pick: VertexPick::Uniform,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeCfg {
    pub method: OptimizeMethod,
    pub seed: u64,
    /// Iteration cap for the iterative strategies.
    pub max_iterations: usize,
    /// Record every n-th trial in the trial log.
    pub sample_rate: usize,
    /// Ideal normals are the source normals reflected across the plane with
    /// this normal.
    pub ideal_mirror_axis: [f64; 3],
    pub planar: PlanarCfg,
    pub propagation: PropagationCfg,
    pub greedy: GreedyCfg,
    pub anneal: AnnealCfg,
}

impl Default for OptimizeCfg {
    fn default() -> Self {
        Self {
            method: OptimizeMethod::Greedy,
            seed: 0,
            max_iterations: 10_000,
            sample_rate: 1,
            ideal_mirror_axis: [0.0, 0.0, 1.0],
            planar: PlanarCfg::default(),
            propagation: PropagationCfg::default(),
            greedy: GreedyCfg::default(),
            anneal: AnnealCfg::default(),
        }
    }
}

impl OptimizeCfg {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AnamorphError::invalid("sample_rate must be >= 1"));
        }
        if Vector3::from(self.ideal_mirror_axis).norm() == 0.0 {
            return Err(AnamorphError::invalid("ideal_mirror_axis must be non-zero"));
        }
        if Vector3::from(self.propagation.seed_axis).norm() == 0.0 {
            return Err(AnamorphError::invalid("propagation.seed_axis must be non-zero"));
        }
        if !(self.propagation.tolerance_sq >= 0.0) {
            return Err(AnamorphError::invalid("propagation.tolerance_sq must be >= 0"));
        }
        let g = &self.greedy;
        if !(g.step_fraction > 0.0 && g.step_fraction < 1.0) {
            return Err(AnamorphError::invalid(format!(
                "greedy.step_fraction must be within (0, 1), got {}",
                g.step_fraction
            )));
        }
        let a = &self.anneal;
        if !(a.offset_step > 0.0 && a.offset_range >= a.offset_step) {
            return Err(AnamorphError::invalid(format!(
                "anneal offsets need 0 < offset_step <= offset_range, got step {} range {}",
                a.offset_step, a.offset_range
            )));
        }
        if !(a.t_min >= 0.0 && a.t_max >= a.t_min) {
            return Err(AnamorphError::invalid(format!(
                "anneal temperatures need 0 <= t_min <= t_max, got {}..{}",
                a.t_min, a.t_max
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn ideal_axis(&self) -> Vector3<f64> {
        Vector3::from(self.ideal_mirror_axis).normalize()
    }
}
