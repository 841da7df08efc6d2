//! Normal-deviation experiments without mirrors.
//!
//! Purpose
//! - Measure how well the iterative optimizers recover a known normal field:
//!   deform a source mesh along the view rays, then let greedy or annealing
//!   pull the vertex normals back towards the undeformed ones.
//!
//! Lifecycle
//! - `None → Initialized → Deformed → {OptimizingManual | OptimizingAll} →
//!   Optimized → [Smoothed]`; `reset` returns to `None` from anywhere.
//! - Calls in the wrong state return `AnamorphError::InvalidState` and leave
//!   the experiment untouched. `OptimizingAll` only exists for the duration of
//!   the call that runs the optimizer to completion.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnamorphError, Result};
use crate::mesh::{recalculate_normals, MeshBuffers, MeshSink, SourceMesh, VertexIdentity, IDENTITY_EPS};
use crate::optimize::{
    OptimizeCfg, OptimizeMethod, OptimizerRun, RayField, RayMesh, RunReport, RunSummary,
    StepResult, TrialLog,
};

/// Controlled deformation of the along-ray distances, applied per identity group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeformMethod {
    None,
    /// Multiply the distance of one group (groups ordered by smallest member).
    ScaleGroup { group: usize, factor: f64 },
    /// Multiply every group's distance by `1 + u`, `u` uniform in `±amplitude`.
    RandomScale { amplitude: f64, seed: u64 },
}

impl Default for DeformMethod {
    fn default() -> Self {
        DeformMethod::ScaleGroup {
            group: 3,
            factor: 1.1,
        }
    }
}

impl DeformMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DeformMethod::None => "none",
            DeformMethod::ScaleGroup { .. } => "scale_group",
            DeformMethod::RandomScale { .. } => "random_scale",
        }
    }

    /// Per-group distance factors for `groups` groups.
    fn factors(&self, groups: usize) -> Result<Vec<f64>> {
        let mut f = vec![1.0; groups];
        match *self {
            DeformMethod::None => {}
            DeformMethod::ScaleGroup { group, factor } => {
                if group >= groups {
                    return Err(AnamorphError::invalid(format!(
                        "deform group {group} out of range (mesh has {groups} groups)"
                    )));
                }
                if !(factor > 0.0) {
                    return Err(AnamorphError::invalid(format!(
                        "deform factor must be > 0, got {factor}"
                    )));
                }
                f[group] = factor;
            }
            DeformMethod::RandomScale { amplitude, seed } => {
                if !(0.0..1.0).contains(&amplitude) {
                    return Err(AnamorphError::invalid(format!(
                        "deform amplitude must be within [0, 1), got {amplitude}"
                    )));
                }
                let mut rng = StdRng::seed_from_u64(seed);
                for x in f.iter_mut() {
                    *x = 1.0 + rng.gen_range(-amplitude..=amplitude);
                }
            }
        }
        Ok(f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One iteration per `step` call.
    Manual,
    /// Run to completion inside `start`.
    #[default]
    All,
}

/// Laplacian smoothing of along-ray distances over the group adjacency graph.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothCfg {
    pub iterations: usize,
    /// Fraction of the way each group moves towards its neighbours' mean.
    pub lambda: f64,
}

impl Default for SmoothCfg {
    fn default() -> Self {
        Self {
            iterations: 10,
            lambda: 0.5,
        }
    }
}

impl SmoothCfg {
    pub fn validate(&self) -> Result<()> {
        if !(self.lambda > 0.0 && self.lambda <= 1.0) {
            return Err(AnamorphError::invalid(format!(
                "smoothing lambda must be within (0, 1], got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExperimentStatus {
    None,
    Initialized,
    Deformed,
    OptimizingManual,
    OptimizingAll,
    Optimized,
    Smoothed,
}

impl ExperimentStatus {
    pub fn name(self) -> &'static str {
        match self {
            ExperimentStatus::None => "None",
            ExperimentStatus::Initialized => "Initialized",
            ExperimentStatus::Deformed => "Deformed",
            ExperimentStatus::OptimizingManual => "OptimizingManual",
            ExperimentStatus::OptimizingAll => "OptimizingAll",
            ExperimentStatus::Optimized => "Optimized",
            ExperimentStatus::Smoothed => "Smoothed",
        }
    }
}

/// Data fixed at initialization.
#[derive(Clone, Debug)]
struct Base {
    source: SourceMesh,
    global_vertices: Vec<Vector3<f64>>,
    identity: VertexIdentity,
    /// Rays from the view point with the undeformed distances.
    field: RayField,
    ideal_normals: Vec<Vector3<f64>>,
}

#[derive(Clone, Debug)]
struct Working {
    base: Base,
    deformation: DeformMethod,
    mesh: RayMesh,
}

#[derive(Clone, Debug)]
struct Running {
    work: Working,
    run: OptimizerRun,
}

#[derive(Clone, Debug)]
struct Finished {
    work: Working,
    summary: RunSummary,
    log: TrialLog,
}

#[derive(Clone, Debug, Default)]
enum ExperimentState {
    #[default]
    None,
    Initialized(Box<Base>),
    Deformed(Box<Working>),
    OptimizingManual(Box<Running>),
    OptimizingAll(Box<Running>),
    Optimized(Box<Finished>),
    Smoothed(Box<Finished>),
}

impl ExperimentState {
    fn status(&self) -> ExperimentStatus {
        match self {
            ExperimentState::None => ExperimentStatus::None,
            ExperimentState::Initialized(_) => ExperimentStatus::Initialized,
            ExperimentState::Deformed(_) => ExperimentStatus::Deformed,
            ExperimentState::OptimizingManual(_) => ExperimentStatus::OptimizingManual,
            ExperimentState::OptimizingAll(_) => ExperimentStatus::OptimizingAll,
            ExperimentState::Optimized(_) => ExperimentStatus::Optimized,
            ExperimentState::Smoothed(_) => ExperimentStatus::Smoothed,
        }
    }

    fn working(&self) -> Option<&Working> {
        match self {
            ExperimentState::None | ExperimentState::Initialized(_) => None,
            ExperimentState::Deformed(w) => Some(w),
            ExperimentState::OptimizingManual(r) | ExperimentState::OptimizingAll(r) => {
                Some(&r.work)
            }
            ExperimentState::Optimized(f) | ExperimentState::Smoothed(f) => Some(&f.work),
        }
    }
}

/// Deform-then-optimize experiment on one source mesh.
#[derive(Clone, Debug)]
pub struct NormalExperiment {
    cfg: OptimizeCfg,
    state: ExperimentState,
}

impl NormalExperiment {
    pub fn new(cfg: OptimizeCfg) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            state: ExperimentState::None,
        })
    }

    #[inline]
    pub fn cfg(&self) -> &OptimizeCfg {
        &self.cfg
    }

    #[inline]
    pub fn status(&self) -> ExperimentStatus {
        self.state.status()
    }

    fn wrong_state(&self, op: &'static str) -> AnamorphError {
        AnamorphError::state(op, self.status().name())
    }

    /// Capture global positions, view rays and the ideal (undeformed) normals.
    pub fn initialize(&mut self, source: &SourceMesh, view_point: Vector3<f64>) -> Result<()> {
        if self.status() != ExperimentStatus::None {
            return Err(self.wrong_state("initialize"));
        }
        source.validate()?;
        let global_vertices = source.global_vertices();
        let identity = VertexIdentity::build(&global_vertices, IDENTITY_EPS);
        let field = RayField::from_view(view_point, &global_vertices);
        let ideal_normals = recalculate_normals(
            &global_vertices,
            &source.triangles,
            &identity,
            source.continuous,
        );
        debug!(
            object = %source.name,
            vertices = global_vertices.len(),
            groups = identity.group_count(),
            "experiment initialized"
        );
        self.state = ExperimentState::Initialized(Box::new(Base {
            source: source.clone(),
            global_vertices,
            identity,
            field,
            ideal_normals,
        }));
        Ok(())
    }

    pub fn deform(&mut self, method: DeformMethod) -> Result<&RayMesh> {
        let ExperimentState::Initialized(base) = &self.state else {
            return Err(self.wrong_state("deform"));
        };
        let factors = method.factors(base.identity.group_count())?;
        let mut distances = base.field.distances.clone();
        for (g, members) in base.identity.groups().iter().enumerate() {
            let d = base.field.distances[members[0]] * factors[g];
            for &v in members {
                distances[v] = d;
            }
        }
        let mut mesh = RayMesh::new(
            base.field.clone(),
            base.source.triangles.clone(),
            base.identity.clone(),
            base.source.continuous,
            base.ideal_normals.clone(),
        )?;
        mesh.set_distances(distances)?;
        info!(
            deformation = method.name(),
            total_deviation = mesh.total(),
            "mesh deformed"
        );
        let ExperimentState::Initialized(base) = std::mem::take(&mut self.state) else {
            return Err(self.wrong_state("deform"));
        };
        self.state = ExperimentState::Deformed(Box::new(Working {
            base: *base,
            deformation: method,
            mesh,
        }));
        self.mesh().ok_or_else(|| self.wrong_state("deform"))
    }

    /// Start an iterative optimizer. `RunMode::All` returns once the run has
    /// finished; `RunMode::Manual` waits for `step`/`finish` calls.
    pub fn start(&mut self, method: OptimizeMethod, mode: RunMode) -> Result<()> {
        let ExperimentState::Deformed(work) = &self.state else {
            return Err(self.wrong_state("start"));
        };
        let run = OptimizerRun::new(method, &self.cfg, &work.mesh)?;
        let ExperimentState::Deformed(work) = std::mem::take(&mut self.state) else {
            return Err(self.wrong_state("start"));
        };
        let running = Box::new(Running { work: *work, run });
        match mode {
            RunMode::Manual => {
                self.state = ExperimentState::OptimizingManual(running);
            }
            RunMode::All => {
                self.state = ExperimentState::OptimizingAll(running);
                self.finish()?;
            }
        }
        Ok(())
    }

    /// One optimizer iteration; valid only in `OptimizingManual`. The run
    /// moves to `Optimized` when the step reports `Finished`.
    pub fn step(&mut self) -> Result<StepResult> {
        let status = self.status();
        let ExperimentState::OptimizingManual(running) = &mut self.state else {
            return Err(AnamorphError::state("step", status.name()));
        };
        let Running { work, run } = running.as_mut();
        let r = run.step(&mut work.mesh);
        if let StepResult::Finished(_) = r {
            self.complete();
        }
        Ok(r)
    }

    /// Run the active optimizer to completion.
    pub fn finish(&mut self) -> Result<RunSummary> {
        let status = self.status();
        let running = match &mut self.state {
            ExperimentState::OptimizingManual(r) | ExperimentState::OptimizingAll(r) => r,
            _ => return Err(AnamorphError::state("finish", status.name())),
        };
        let Running { work, run } = running.as_mut();
        let summary = run.run_to_end(&mut work.mesh);
        self.complete();
        Ok(summary)
    }

    fn complete(&mut self) {
        let running = match std::mem::take(&mut self.state) {
            ExperimentState::OptimizingManual(r) | ExperimentState::OptimizingAll(r) => r,
            other => {
                self.state = other;
                return;
            }
        };
        let Running { work, run } = *running;
        let summary = run.summary(&work.mesh);
        self.state = ExperimentState::Optimized(Box::new(Finished {
            work,
            summary,
            log: run.into_log(),
        }));
    }

    /// Laplacian smoothing of the optimized distances; `Optimized → Smoothed`.
    pub fn smooth(&mut self, cfg: SmoothCfg) -> Result<&RayMesh> {
        let ExperimentState::Optimized(done) = &self.state else {
            return Err(self.wrong_state("smooth"));
        };
        cfg.validate()?;
        let distances = smoothed_distances(&done.work.mesh, &cfg);
        let ExperimentState::Optimized(mut done) = std::mem::take(&mut self.state) else {
            return Err(self.wrong_state("smooth"));
        };
        let before = done.work.mesh.total();
        if let Err(e) = done.work.mesh.set_distances(distances) {
            self.state = ExperimentState::Optimized(done);
            return Err(e);
        }
        info!(
            iterations = cfg.iterations,
            lambda = cfg.lambda,
            before,
            after = done.work.mesh.total(),
            "smoothed optimized distances"
        );
        self.state = ExperimentState::Smoothed(done);
        self.mesh().ok_or_else(|| self.wrong_state("smooth"))
    }

    pub fn report(&self, object_name: &str) -> Result<RunReport> {
        let done = match &self.state {
            ExperimentState::Optimized(f) | ExperimentState::Smoothed(f) => f,
            _ => return Err(self.wrong_state("report")),
        };
        Ok(RunReport {
            object_name: object_name.to_string(),
            seed: self.cfg.seed,
            deformation: done.work.deformation.name().to_string(),
            optimizer: done.summary.method.name().to_string(),
            sample_rate: self.cfg.sample_rate,
            offset_range: self.cfg.anneal.offset_range,
            initial_total: done.summary.initial_total,
            final_total: done.work.mesh.total(),
            trials: done.log.trials.clone(),
            final_vertices: done
                .work
                .mesh
                .positions()
                .iter()
                .map(|v| [v.x, v.y, v.z])
                .collect(),
        })
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match &self.state {
            ExperimentState::Optimized(f) | ExperimentState::Smoothed(f) => Some(&f.summary),
            _ => None,
        }
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.state = ExperimentState::None;
    }

    /// Current mesh from `Deformed` on.
    pub fn mesh(&self) -> Option<&RayMesh> {
        self.state.working().map(|w| &w.mesh)
    }

    /// Renderable snapshot of the current mesh.
    pub fn buffers(&self) -> Option<MeshBuffers> {
        let w = self.state.working()?;
        Some(MeshBuffers {
            vertices: w.mesh.positions().to_vec(),
            triangles: w.base.source.triangles.clone(),
            uv0: w.base.source.uv0(),
            source_normals: w.base.ideal_normals.clone(),
            normals: w.mesh.normals().to_vec(),
        })
    }

    pub fn publish<S: MeshSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        let buffers = self.buffers().ok_or_else(|| self.wrong_state("publish"))?;
        let suffix = match self.status() {
            ExperimentStatus::Optimized => "optimized",
            ExperimentStatus::Smoothed => "smoothed",
            _ => "deformed",
        };
        let name = self
            .state
            .working()
            .map(|w| format!("{}_{suffix}", w.base.source.name))
            .unwrap_or_default();
        sink.accept(&name, &buffers);
        Ok(())
    }

    /// Undeformed global source positions (from `Initialized` on).
    pub fn original_vertices(&self) -> Option<&[Vector3<f64>]> {
        match &self.state {
            ExperimentState::None => None,
            ExperimentState::Initialized(b) => Some(&b.global_vertices),
            _ => self.state.working().map(|w| &w.base.global_vertices[..]),
        }
    }
}

/// Group-level Laplacian smoothing; members of a group keep one distance.
fn smoothed_distances(mesh: &RayMesh, cfg: &SmoothCfg) -> Vec<f64> {
    let identity = mesh.identity();
    let groups = identity.group_count();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); groups];
    for &[a, b, c] in mesh.triangles() {
        let g = [identity.group_id(a), identity.group_id(b), identity.group_id(c)];
        for (x, y) in [(g[0], g[1]), (g[1], g[2]), (g[2], g[0])] {
            if x != y {
                neighbours[x].push(y);
                neighbours[y].push(x);
            }
        }
    }
    for n in neighbours.iter_mut() {
        n.sort_unstable();
        n.dedup();
    }
    let mut d: Vec<f64> = identity
        .groups()
        .iter()
        .map(|members| mesh.distance(members[0]))
        .collect();
    for _ in 0..cfg.iterations {
        let prev = d.clone();
        for g in 0..groups {
            if neighbours[g].is_empty() {
                continue;
            }
            let mean = neighbours[g].iter().map(|&h| prev[h]).sum::<f64>()
                / neighbours[g].len() as f64;
            d[g] = prev[g] + cfg.lambda * (mean - prev[g]);
        }
    }
    let mut out = vec![0.0; mesh.len()];
    for (g, members) in identity.groups().iter().enumerate() {
        for &v in members {
            out[v] = d[g];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grid_source, origin};

    fn initialized() -> NormalExperiment {
        let mut e = NormalExperiment::new(OptimizeCfg {
            max_iterations: 200,
            ..OptimizeCfg::default()
        })
        .unwrap();
        e.initialize(&grid_source(4, 1.0, 3.0), origin()).unwrap();
        e
    }

    #[test]
    fn happy_path_reaches_smoothed() {
        let mut e = initialized();
        assert_eq!(e.status(), ExperimentStatus::Initialized);
        let deformed_total = e.deform(DeformMethod::default()).unwrap().total();
        assert!(deformed_total > 0.0);
        e.start(OptimizeMethod::Greedy, RunMode::All).unwrap();
        assert_eq!(e.status(), ExperimentStatus::Optimized);
        let s = *e.summary().unwrap();
        assert!(s.final_total <= deformed_total);
        e.smooth(SmoothCfg::default()).unwrap();
        assert_eq!(e.status(), ExperimentStatus::Smoothed);
        let r = e.report("grid").unwrap();
        assert_eq!(r.deformation, "scale_group");
        assert_eq!(r.optimizer, "greedy");
        assert_eq!(r.final_vertices.len(), 16);
        assert!(r.file_name().starts_with("grid_scale-group_greedy_sr1_or"));
    }

    #[test]
    fn deformation_scales_one_group_along_its_ray() {
        let mut e = initialized();
        let original = e.original_vertices().unwrap().to_vec();
        let mesh = e
            .deform(DeformMethod::ScaleGroup {
                group: 3,
                factor: 1.1,
            })
            .unwrap();
        for (i, (p, q)) in mesh.positions().iter().zip(&original).enumerate() {
            if i == 3 {
                assert!((p - q * 1.1).norm() < 1e-9);
            } else {
                assert!((p - q).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn undeformed_mesh_has_zero_deviation() {
        let mut e = initialized();
        let mesh = e.deform(DeformMethod::None).unwrap();
        assert!(mesh.total() < 1e-9);
    }

    #[test]
    fn random_deformation_is_seeded() {
        let deform = |seed| {
            let mut e = initialized();
            e.deform(DeformMethod::RandomScale {
                amplitude: 0.05,
                seed,
            })
            .unwrap()
            .positions()
            .to_vec()
        };
        assert_eq!(deform(1), deform(1));
        assert_ne!(deform(1), deform(2));
    }

    #[test]
    fn manual_stepping_lands_in_optimized() {
        let mut e = initialized();
        e.deform(DeformMethod::default()).unwrap();
        e.start(OptimizeMethod::Anneal, RunMode::Manual).unwrap();
        assert_eq!(e.status(), ExperimentStatus::OptimizingManual);
        let mut steps = 0;
        loop {
            let r = e.step().unwrap();
            if let StepResult::Finished(reason) = r {
                assert_eq!(reason, crate::optimize::FinishReason::IterationCap);
                break;
            }
            steps += 1;
        }
        assert_eq!(steps, 200);
        assert_eq!(e.status(), ExperimentStatus::Optimized);
        assert!(matches!(
            e.step(),
            Err(AnamorphError::InvalidState { op: "step", state: "Optimized" })
        ));
    }

    #[test]
    fn finish_completes_a_manual_run() {
        let mut e = initialized();
        e.deform(DeformMethod::default()).unwrap();
        e.start(OptimizeMethod::Greedy, RunMode::Manual).unwrap();
        e.step().unwrap();
        let s = e.finish().unwrap();
        assert!(s.reason.is_some());
        assert_eq!(e.status(), ExperimentStatus::Optimized);
    }

    #[test]
    fn wrong_state_calls_leave_state_unchanged() {
        let mut e = NormalExperiment::new(OptimizeCfg::default()).unwrap();
        assert!(matches!(
            e.deform(DeformMethod::None),
            Err(AnamorphError::InvalidState { op: "deform", state: "None" })
        ));
        assert!(e.start(OptimizeMethod::Greedy, RunMode::All).is_err());
        assert!(e.step().is_err());
        assert!(e.smooth(SmoothCfg::default()).is_err());
        assert!(e.report("x").is_err());
        assert_eq!(e.status(), ExperimentStatus::None);

        let mut e = initialized();
        assert!(e.initialize(&grid_source(2, 1.0, 3.0), origin()).is_err());
        assert!(e.smooth(SmoothCfg::default()).is_err());
        assert_eq!(e.status(), ExperimentStatus::Initialized);

        // Closed-form methods cannot be stepped; the deformed mesh survives.
        e.deform(DeformMethod::default()).unwrap();
        assert!(e.start(OptimizeMethod::Planar, RunMode::All).is_err());
        assert_eq!(e.status(), ExperimentStatus::Deformed);
        assert!(e.deform(DeformMethod::None).is_err());
    }

    #[test]
    fn bad_deformation_keeps_initialized() {
        let mut e = initialized();
        let err = e
            .deform(DeformMethod::ScaleGroup {
                group: 99,
                factor: 1.1,
            })
            .unwrap_err();
        assert!(matches!(err, AnamorphError::InvalidConfig { .. }));
        assert_eq!(e.status(), ExperimentStatus::Initialized);
    }

    #[test]
    fn reset_from_any_state() {
        let mut e = initialized();
        e.deform(DeformMethod::default()).unwrap();
        e.start(OptimizeMethod::Greedy, RunMode::Manual).unwrap();
        e.reset();
        assert_eq!(e.status(), ExperimentStatus::None);
        assert!(e.mesh().is_none());
        assert!(e.original_vertices().is_none());
    }

    #[test]
    fn smoothing_flattens_a_single_bump() {
        let mut e = initialized();
        let bumped = e
            .deform(DeformMethod::ScaleGroup {
                group: 5,
                factor: 1.3,
            })
            .unwrap()
            .distance(5);
        // Zero iterations: the optimizer leaves the mesh as deformed.
        e.cfg.max_iterations = 0;
        e.start(OptimizeMethod::Greedy, RunMode::All).unwrap();
        let smoothed = e
            .smooth(SmoothCfg {
                iterations: 5,
                lambda: 0.5,
            })
            .unwrap();
        assert!(smoothed.distance(5) < bumped);
        // Smoothing only moves vertices along their view rays.
        let v = smoothed.positions()[5];
        let dir = smoothed.field().directions[5];
        assert!((v.normalize() - dir).norm() < 1e-9);
    }

    #[test]
    fn publish_names_mesh_after_stage() {
        struct Names(Vec<String>);
        impl MeshSink for Names {
            fn accept(&mut self, name: &str, _mesh: &MeshBuffers) {
                self.0.push(name.to_string());
            }
        }
        let mut e = initialized();
        let mut sink = Names(Vec::new());
        assert!(e.publish(&mut sink).is_err());
        e.deform(DeformMethod::None).unwrap();
        e.publish(&mut sink).unwrap();
        e.start(OptimizeMethod::Greedy, RunMode::Manual).unwrap();
        e.publish(&mut sink).unwrap();
        e.finish().unwrap();
        assert_eq!(e.status(), ExperimentStatus::Optimized);
        e.publish(&mut sink).unwrap();
        e.smooth(SmoothCfg::default()).unwrap();
        e.publish(&mut sink).unwrap();
        assert_eq!(
            sink.0,
            ["grid_deformed", "grid_deformed", "grid_optimized", "grid_smoothed"]
        );
    }
}
