use crate::{
    checkpoint,
    config::{ConfigErrors, DockingParams, Environment, FarmConfig, FarmInputs},
    database::ShardError,
    distributed::{
        group::{GroupError, ProcessGroup},
        local::LocalGroup,
        master::{DispatchReport, Master},
        worker::{Worker, WorkerReport},
    },
    executors::Engine,
    keyspace::{self, WorkSet},
};
use parking_lot::Mutex;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Shard(#[from] ShardError),
}

/// Result of a complete farm run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmReport {
    pub dispatch: DispatchReport,
    pub workers: Vec<WorkerReport>,
}

enum Outcome {
    Master(Result<DispatchReport, GroupError>),
    Worker(Result<WorkerReport, GroupError>),
}

/// Load the config and all inputs, every problem found is logged before failing
pub fn prepare(
    config: &Path,
    environment: &Environment,
) -> Result<(FarmConfig, FarmInputs), RunError> {
    let config = FarmConfig::load(config)?;
    let inputs = config.load_inputs(environment)?;

    if config.preflight_checks(environment, &inputs) {
        return Err(ConfigErrors::Preflight.into());
    }

    info!(
        receptors = inputs.receptors.len(),
        ligands = inputs.ligands.len(),
        combinations = inputs.combinations.as_ref().map(Vec::len),
        "Loaded inputs"
    );

    Ok((config, inputs))
}

/// the full key space of a run
pub fn plan(inputs: &FarmInputs) -> WorkSet {
    keyspace::build(
        &inputs.receptors,
        &inputs.ligands,
        inputs.combinations.as_deref(),
    )
}

/// Drop every key found in any shard, scanning all shards from the calling thread
pub fn remove_finished(
    work: &mut WorkSet,
    environment: &Environment,
    retry_failed: bool,
) -> Result<usize, RunError> {
    let shards = checkpoint::discover_shards(&environment.shard_dir())?;
    let keys = checkpoint::scan_partition(&shards, 0, 1, retry_failed);

    Ok(keyspace::remove_completed(work, keys))
}

/// Run the whole farm over an in-process group of `processes` participants
pub fn run_farm<E>(
    work: WorkSet,
    params: &DockingParams,
    environment: &Environment,
    engine: &E,
    processes: usize,
    retry_failed: bool,
) -> Result<FarmReport, RunError>
where
    E: Engine + Clone + Send + Sync,
{
    if processes < 2 {
        return Err(ConfigErrors::TooFewProcesses(processes).into());
    }

    environment.prepare()?;

    let group = LocalGroup::new(processes)?;
    let work = Mutex::new(Some(work));

    let outcomes = group.run(|endpoint| {
        if endpoint.is_master() {
            let work = work.lock().take().unwrap_or_default();

            Outcome::Master(Master::new(endpoint, params.clone()).run(work))
        } else {
            Outcome::Worker(Worker::new(endpoint, engine.clone(), environment, retry_failed).run())
        }
    })?;

    let mut report = FarmReport::default();

    for outcome in outcomes {
        match outcome {
            Outcome::Master(dispatch) => report.dispatch = dispatch?,
            Outcome::Worker(worker) => report.workers.push(worker?),
        }
    }

    Ok(report)
}

#[cfg(test)]
#[path = "farm_test.rs"]
mod farm_test;
