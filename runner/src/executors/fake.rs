use super::{Engine, EngineError, JobInput, JobOutput};
use crate::keys::JobKey;
use parking_lot::Mutex;
use std::{collections::HashMap, collections::HashSet, fs, path::Path, sync::Arc};

/// Deterministic engine for tests, records every key it was asked to dock
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    default_scores: Vec<f64>,
    scores: HashMap<JobKey, Vec<f64>>,
    failing: HashSet<JobKey>,
    calls: Arc<Mutex<Vec<JobKey>>>,
}

impl FakeEngine {
    pub fn new(default_scores: &[f64]) -> Self {
        Self {
            default_scores: default_scores.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_scores(mut self, key: &str, scores: &[f64]) -> Self {
        self.scores.insert(key.parse().unwrap(), scores.to_vec());
        self
    }

    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.parse().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<JobKey> {
        self.calls.lock().clone()
    }
}

impl Engine for FakeEngine {
    fn dock(&self, input: &JobInput, scratch_root: &Path) -> JobOutput {
        self.calls.lock().push(input.key.clone());

        let scratch = scratch_root.join(input.key.scratch_name());
        let scratch_dir = fs::create_dir_all(&scratch).ok().map(|()| scratch);

        if self.failing.contains(&input.key) {
            return JobOutput::failed(&EngineError::NoPoses, scratch_dir);
        }

        let scores = self
            .scores
            .get(&input.key)
            .unwrap_or(&self.default_scores)
            .clone();

        JobOutput {
            success: true,
            num_pose: scores.len() as u32,
            message: String::new(),
            scores,
            score_log: format!("docked {}", input.key),
            poses: "MODEL 1\nENDMDL\n".to_owned(),
            scratch_dir,
        }
    }
}
