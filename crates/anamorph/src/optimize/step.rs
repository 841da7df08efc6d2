//! Iteration-at-a-time driver for the iterative strategies.
//!
//! Purpose
//! - Let callers interleave optimization with other work (manual stepping,
//!   progress display) without callbacks: the run state is an explicit value.
//! - Any `RayMesh` observed between steps is a consistent partial result.

use tracing::{debug, info};

use super::anneal::AnnealState;
use super::cfg::{OptimizeCfg, OptimizeMethod};
use super::field::RayMesh;
use super::greedy::GreedyState;
use super::report::TrialLog;
use crate::error::{AnamorphError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// No candidate vertex improves the total any more.
    Stuck,
    IterationCap,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepResult {
    Accepted {
        iteration: usize,
        vertex: usize,
        total: f64,
    },
    Rejected {
        iteration: usize,
        vertex: usize,
        proposed: Option<f64>,
    },
    /// Vertex not worth moving (negligible deviation or no ray).
    Skipped { iteration: usize, vertex: usize },
    Finished(FinishReason),
}

#[derive(Clone, Debug)]
enum Strategy {
    Greedy(GreedyState),
    Anneal(AnnealState),
}

/// Counters of a finished (or interrupted) run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub method: OptimizeMethod,
    pub iterations: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub reason: Option<FinishReason>,
    pub initial_total: f64,
    pub final_total: f64,
}

#[derive(Clone, Debug)]
pub struct OptimizerRun {
    strategy: Strategy,
    log: TrialLog,
    initial_total: f64,
    finished: Option<FinishReason>,
}

impl OptimizerRun {
    /// Start a greedy or annealing run on `mesh`.
    pub fn new(method: OptimizeMethod, cfg: &OptimizeCfg, mesh: &RayMesh) -> Result<Self> {
        cfg.validate()?;
        let strategy = match method {
            OptimizeMethod::Greedy => Strategy::Greedy(GreedyState::new(
                cfg.greedy,
                cfg.seed,
                cfg.max_iterations,
                mesh,
            )),
            OptimizeMethod::Anneal => Strategy::Anneal(AnnealState::new(
                cfg.anneal,
                cfg.seed,
                cfg.max_iterations,
                mesh,
            )),
            other => {
                return Err(AnamorphError::invalid(format!(
                    "{} is not an iterative optimizer",
                    other.name()
                )))
            }
        };
        debug!(method = method.name(), total = mesh.total(), "optimizer run started");
        Ok(Self {
            strategy,
            log: TrialLog::new(cfg.sample_rate),
            initial_total: mesh.total(),
            finished: None,
        })
    }

    pub fn step(&mut self, mesh: &mut RayMesh) -> StepResult {
        if let Some(reason) = self.finished {
            return StepResult::Finished(reason);
        }
        let r = match &mut self.strategy {
            Strategy::Greedy(s) => s.step(mesh, &mut self.log),
            Strategy::Anneal(s) => s.step(mesh, &mut self.log),
        };
        if let StepResult::Finished(reason) = r {
            self.finished = Some(reason);
            let summary = self.summary(mesh);
            info!(
                method = summary.method.name(),
                iterations = summary.iterations,
                accepted = summary.accepted,
                rejected = summary.rejected,
                skipped = summary.skipped,
                reason = ?reason,
                initial_total = summary.initial_total,
                final_total = summary.final_total,
                "optimizer run finished"
            );
        }
        r
    }

    /// Step until the strategy reports `Finished`.
    pub fn run_to_end(&mut self, mesh: &mut RayMesh) -> RunSummary {
        while !matches!(self.step(mesh), StepResult::Finished(_)) {}
        self.summary(mesh)
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    #[inline]
    pub fn log(&self) -> &TrialLog {
        &self.log
    }

    pub fn into_log(self) -> TrialLog {
        self.log
    }

    pub fn method(&self) -> OptimizeMethod {
        match self.strategy {
            Strategy::Greedy(_) => OptimizeMethod::Greedy,
            Strategy::Anneal(_) => OptimizeMethod::Anneal,
        }
    }

    pub fn summary(&self, mesh: &RayMesh) -> RunSummary {
        let (iterations, accepted, rejected, skipped) = match &self.strategy {
            Strategy::Greedy(s) => (s.iteration(), s.accepted, s.rejected, s.too_small),
            Strategy::Anneal(s) => (s.iteration(), s.accepted, s.rejected, 0),
        };
        RunSummary {
            method: self.method(),
            iterations,
            accepted,
            rejected,
            skipped,
            reason: self.finished,
            initial_total: self.initial_total,
            final_total: mesh.total(),
        }
    }
}
