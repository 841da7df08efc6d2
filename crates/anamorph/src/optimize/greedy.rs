//! Largest-deviation-first hill climbing.
//!
//! Vertices are ranked by deviation (descending). Each iteration looks at the
//! vertex at `stuck_offset` in the ranking, nudges its group along the ray by
//! `±step_fraction` of the current distance, and keeps the move when the
//! total deviation does not increase. An accepted move re-ranks and resets
//! `stuck_offset`; a rejection or negligible vertex advances it. The search is
//! stuck once every ranked vertex was tried without success.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::cfg::GreedyCfg;
use super::field::RayMesh;
use super::report::{Trial, TrialLog};
use super::step::{FinishReason, StepResult};

#[derive(Clone, Debug)]
pub struct GreedyState {
    cfg: GreedyCfg,
    rng: StdRng,
    ranking: Vec<usize>,
    stuck_offset: usize,
    iteration: usize,
    max_iterations: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub too_small: usize,
}

impl GreedyState {
    pub fn new(cfg: GreedyCfg, seed: u64, max_iterations: usize, mesh: &RayMesh) -> Self {
        let mut s = Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
            ranking: Vec::new(),
            stuck_offset: 0,
            iteration: 0,
            max_iterations,
            accepted: 0,
            rejected: 0,
            too_small: 0,
        };
        s.rerank(mesh);
        s
    }

    fn rerank(&mut self, mesh: &RayMesh) {
        let dev = mesh.deviations();
        self.ranking = (0..mesh.len()).collect();
        // Stable: equal deviations keep ascending vertex order.
        self.ranking.sort_by(|&a, &b| dev[b].total_cmp(&dev[a]));
    }

    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    #[inline]
    pub fn stuck_offset(&self) -> usize {
        self.stuck_offset
    }

    pub fn step(&mut self, mesh: &mut RayMesh, log: &mut TrialLog) -> StepResult {
        if self.iteration >= self.max_iterations {
            return StepResult::Finished(FinishReason::IterationCap);
        }
        if self.stuck_offset >= self.ranking.len() {
            return StepResult::Finished(FinishReason::Stuck);
        }
        let iteration = self.iteration;
        self.iteration += 1;

        let vertex = self.ranking[self.stuck_offset];
        if !mesh.is_valid(vertex) || mesh.deviations()[vertex] < self.cfg.negligible_deg {
            self.too_small += 1;
            self.stuck_offset += 1;
            return StepResult::Skipped { iteration, vertex };
        }

        let current = mesh.distance(vertex);
        let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let proposed = current * (1.0 + sign * self.cfg.step_fraction);
        let candidate = mesh.propose(vertex, proposed);
        let previous_total = mesh.total();
        let proposed_total = candidate.total;
        let accepted = proposed_total <= previous_total;
        log.record(Trial {
            iteration,
            vertex,
            offset: proposed - current,
            temperature: None,
            previous_total,
            proposed_total: Some(proposed_total),
            accepted,
        });

        if accepted {
            mesh.commit(candidate);
            self.accepted += 1;
            self.stuck_offset = 0;
            self.rerank(mesh);
            StepResult::Accepted {
                iteration,
                vertex,
                total: proposed_total,
            }
        } else {
            self.rejected += 1;
            self.stuck_offset += 1;
            StepResult::Rejected {
                iteration,
                vertex,
                proposed: Some(proposed_total),
            }
        }
    }
}
