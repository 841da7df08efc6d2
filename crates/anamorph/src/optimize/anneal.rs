//! Simulated annealing over along-ray distances.
//!
//! Each iteration picks a vertex, adds `k · offset_step` (`k` a non-zero
//! integer within `±⌊offset_range / offset_step⌋`) to its group's distance,
//! and accepts by the Metropolis rule at the scheduled temperature.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::cfg::{AnnealCfg, VertexPick};
use super::field::RayMesh;
use super::report::{Trial, TrialLog};
use super::step::{FinishReason, StepResult};

#[derive(Clone, Debug)]
pub struct AnnealState {
    cfg: AnnealCfg,
    rng: StdRng,
    iteration: usize,
    max_iterations: usize,
    /// Vertices that can move (those with a ray).
    movable: Vec<usize>,
    pub accepted: usize,
    pub rejected: usize,
}

impl AnnealState {
    pub fn new(cfg: AnnealCfg, seed: u64, max_iterations: usize, mesh: &RayMesh) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
            iteration: 0,
            max_iterations,
            movable: (0..mesh.len()).filter(|&i| mesh.is_valid(i)).collect(),
            accepted: 0,
            rejected: 0,
        }
    }

    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Temperature at `iteration` of a run with `max_iterations` steps.
    pub fn temperature(&self, iteration: usize) -> f64 {
        let frac = if self.max_iterations == 0 {
            1.0
        } else {
            iteration as f64 / self.max_iterations as f64
        };
        let c = &self.cfg;
        c.t_min + (c.t_max - c.t_min) * c.curve.eval(1.0 - frac)
    }

    fn pick(&mut self, mesh: &RayMesh) -> usize {
        match self.cfg.pick {
            VertexPick::Uniform => self.movable[self.rng.gen_range(0..self.movable.len())],
            VertexPick::LargestDeviation => {
                let dev = mesh.deviations();
                let mut best = self.movable[0];
                for &v in &self.movable[1..] {
                    if dev[v] > dev[best] {
                        best = v;
                    }
                }
                best
            }
        }
    }

    fn draw_offset(&mut self) -> f64 {
        let k_max = ((self.cfg.offset_range / self.cfg.offset_step).floor() as i64).max(1);
        let k = self.rng.gen_range(1..=k_max);
        let k = if self.rng.gen_bool(0.5) { k } else { -k };
        k as f64 * self.cfg.offset_step
    }

    pub fn step(&mut self, mesh: &mut RayMesh, log: &mut TrialLog) -> StepResult {
        if self.iteration >= self.max_iterations {
            return StepResult::Finished(FinishReason::IterationCap);
        }
        if self.movable.is_empty() {
            return StepResult::Finished(FinishReason::Stuck);
        }
        let iteration = self.iteration;
        self.iteration += 1;
        let temperature = self.temperature(iteration);

        let vertex = self.pick(mesh);
        let offset = self.draw_offset();
        let current = mesh.distance(vertex);
        let proposed = current + offset;
        let previous_total = mesh.total();

        if proposed <= 0.0 {
            self.rejected += 1;
            log.record(Trial {
                iteration,
                vertex,
                offset,
                temperature: Some(temperature),
                previous_total,
                proposed_total: None,
                accepted: false,
            });
            return StepResult::Rejected {
                iteration,
                vertex,
                proposed: None,
            };
        }

        let candidate = mesh.propose(vertex, proposed);
        let proposed_total = candidate.total;
        let delta = proposed_total - previous_total;
        let accepted = if delta < 0.0 {
            true
        } else if temperature > 0.0 {
            self.rng.gen::<f64>() < (-delta / temperature).exp()
        } else {
            false
        };
        log.record(Trial {
            iteration,
            vertex,
            offset,
            temperature: Some(temperature),
            previous_total,
            proposed_total: Some(proposed_total),
            accepted,
        });
        if accepted {
            mesh.commit(candidate);
            self.accepted += 1;
            StepResult::Accepted {
                iteration,
                vertex,
                total: proposed_total,
            }
        } else {
            self.rejected += 1;
            StepResult::Rejected {
                iteration,
                vertex,
                proposed: Some(proposed_total),
            }
        }
    }
}
