//! Trial log and serializable run report.

use serde::{Deserialize, Serialize};

/// One proposed mutation and its outcome.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub iteration: usize,
    pub vertex: usize,
    /// Change of the along-ray distance that was proposed.
    pub offset: f64,
    /// Annealing temperature; `None` for greedy.
    pub temperature: Option<f64>,
    pub previous_total: f64,
    /// `None` when the proposal was rejected without evaluation.
    pub proposed_total: Option<f64>,
    pub accepted: bool,
}

/// Trials recorded every `sample_rate`-th iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialLog {
    pub sample_rate: usize,
    pub trials: Vec<Trial>,
}

impl TrialLog {
    pub fn new(sample_rate: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            trials: Vec::new(),
        }
    }

    /// Keep `trial` when its iteration falls on the sampling grid.
    pub fn record(&mut self, trial: Trial) {
        if trial.iteration % self.sample_rate == 0 {
            self.trials.push(trial);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Persistence record of one optimization run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub object_name: String,
    pub seed: u64,
    pub deformation: String,
    pub optimizer: String,
    pub sample_rate: usize,
    pub offset_range: f64,
    pub initial_total: f64,
    pub final_total: f64,
    pub trials: Vec<Trial>,
    pub final_vertices: Vec<[f64; 3]>,
}

impl RunReport {
    /// `{object}_{deformation}_{optimizer}_sr{rate}_or{range}.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_sr{}_or{}.json",
            sanitize(&self.object_name),
            sanitize(&self.deformation),
            sanitize(&self.optimizer),
            self.sample_rate,
            self.offset_range
        )
    }

    pub fn improvement(&self) -> f64 {
        self.initial_total - self.final_total
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
