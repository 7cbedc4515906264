pub mod command;
#[cfg(test)]
pub mod fake;

use crate::{
    config::{ConfigErrors, DockingParams, EngineConfig, Environment},
    keys::JobKey,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Input file not found: {0:?}")]
    MissingInput(PathBuf),
    #[error("Failed to prepare scratch directory {path:?}: {error}")]
    Scratch {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Failed to spawn engine")]
    Spawn(#[source] std::io::Error),
    #[error("Engine exited with {status}: {stderr}")]
    Exit { status: i32, stderr: String },
    #[error("Engine reported no poses")]
    NoPoses,
}

/// Everything a worker needs to run one job, copied on every dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    pub params: DockingParams,
    pub key: JobKey,
}

/// Outcome of a single job, owned by the worker until it is committed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutput {
    pub success: bool,
    pub num_pose: u32,
    pub message: String,
    pub scores: Vec<f64>,
    pub score_log: String,
    pub poses: String,
    // removed by the caller once the result is committed
    pub scratch_dir: Option<PathBuf>,
}

impl JobOutput {
    /// failed job, the error ends up in the stored message
    pub fn failed(error: &EngineError, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            scratch_dir,
            ..Self::default()
        }
    }
}

/// The docking engine as seen by a worker. Failures are part of the output, a job never
/// aborts the worker loop.
pub trait Engine {
    fn dock(&self, input: &JobInput, scratch_root: &Path) -> JobOutput;
}

#[derive(Clone, Debug)]
pub enum Engines {
    Command(command::CommandEngine),
}

impl Engines {
    pub fn load(config: &EngineConfig, environment: &Environment) -> Result<Self, ConfigErrors> {
        Ok(Self::Command(command::CommandEngine::load(
            config,
            environment,
        )?))
    }
}

impl Engine for Engines {
    fn dock(&self, input: &JobInput, scratch_root: &Path) -> JobOutput {
        match self {
            Self::Command(engine) => engine.dock(input, scratch_root),
        }
    }
}
