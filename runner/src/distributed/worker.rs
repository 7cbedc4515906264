use super::{
    group::{GroupError, ProcessGroup, Source},
    JobFlag, Message, Rank, Tag, MASTER,
};
use crate::{
    checkpoint,
    config::Environment,
    database::{ResultShard, ShardError},
    executors::{Engine, JobInput, JobOutput},
};
use std::{fs, path::PathBuf, time::Instant};
use tracing::{debug, error, info, instrument, warn};

/// What happened to the result of a single job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    // below the score cutoff, intentionally not stored
    Discarded,
    // the shard refused the write, the error is in the job message
    Failed,
}

/// Counters of one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub rank: Rank,
    pub scanned: usize,
    pub executed: usize,
    pub committed: usize,
    pub discarded: usize,
    pub failed_commits: usize,
}

/// A participant that pulls jobs from the master, runs them and appends the results to its own
/// shard. Nobody else ever writes to that shard.
#[derive(Debug)]
pub struct Worker<G, E> {
    group: G,
    engine: E,
    shard_dir: PathBuf,
    shard_path: PathBuf,
    scratch_root: PathBuf,
    // opened on the first commit
    shard: Option<ResultShard>,
    retry_failed: bool,
}

impl<G: ProcessGroup, E: Engine> Worker<G, E> {
    pub fn new(group: G, engine: E, environment: &Environment, retry_failed: bool) -> Self {
        let rank = group.rank();

        Self {
            group,
            engine,
            shard_dir: environment.shard_dir(),
            shard_path: environment.shard_path(rank),
            scratch_root: environment.scratch_dir(rank),
            shard: None,
            retry_failed,
        }
    }

    /// Scan this worker's share of the shards and report the found keys to the master. Always
    /// reports, the master waits for every worker.
    pub fn report_completed(&mut self) -> Result<usize, GroupError> {
        let shards = match checkpoint::discover_shards(&self.shard_dir) {
            Ok(shards) => shards,
            Err(e) => {
                error!(dir = ?self.shard_dir, "Failed to discover shards: {e}");
                Vec::new()
            }
        };

        let index = self.group.rank().saturating_sub(1);
        let keys = checkpoint::scan_partition(
            &shards,
            index,
            self.group.workers(),
            self.retry_failed,
        );
        let found = keys.len();

        self.group.send(MASTER, Message::Completed(keys))?;

        Ok(found)
    }

    fn shard(&mut self) -> Result<&mut ResultShard, ShardError> {
        let shard = match self.shard.take() {
            Some(shard) => shard,
            None => ResultShard::open(&self.shard_path)?,
        };

        Ok(self.shard.insert(shard))
    }

    /// Store the result if it passes the score cutoff. Store errors are kept in the job
    /// message and never abort the worker.
    pub fn commit(&mut self, input: &JobInput, output: &mut JobOutput) -> CommitOutcome {
        if !input.params.accepts(&output.scores) {
            return CommitOutcome::Discarded;
        }

        match self
            .shard()
            .and_then(|shard| shard.append(&input.key, output))
        {
            Ok(()) => CommitOutcome::Committed,
            Err(error) => {
                warn!(key = %input.key, "Failed to store result: {error}");
                output.message = error.to_string();

                CommitOutcome::Failed
            }
        }
    }

    /// run one job, commit it and clean up its scratch directory
    pub fn execute(&mut self, input: JobInput) -> CommitOutcome {
        let mut output = self.engine.dock(&input, &self.scratch_root);
        let outcome = self.commit(&input, &mut output);

        debug!(
            key = %input.key,
            success = output.success,
            outcome = ?outcome,
            "Finished job"
        );

        if let Some(ref dir) = output.scratch_dir {
            if let Err(e) = fs::remove_dir_all(dir) {
                warn!(dir = ?dir, "Failed to remove scratch directory: {e}");
            }
        }

        outcome
    }

    fn next_job(&mut self) -> Result<Option<JobInput>, GroupError> {
        self.group
            .send(MASTER, Message::Ready(self.group.rank()))?;

        match self.group.receive(Source::Rank(MASTER), Tag::Flag)? {
            (_, Message::Flag(JobFlag::Stop)) => return Ok(None),
            (_, Message::Flag(JobFlag::Continue)) => {}
            (from, received) => {
                return Err(GroupError::Unexpected {
                    expected: Tag::Flag,
                    from,
                    received,
                })
            }
        }

        match self.group.receive(Source::Rank(MASTER), Tag::Input)? {
            (_, Message::Input(input)) => Ok(Some(input)),
            (from, received) => Err(GroupError::Unexpected {
                expected: Tag::Input,
                from,
                received,
            }),
        }
    }

    /// pull and execute jobs until the master says stop
    pub fn serve(&mut self, report: &mut WorkerReport) -> Result<(), GroupError> {
        while let Some(input) = self.next_job()? {
            report.executed += 1;

            match self.execute(input) {
                CommitOutcome::Committed => report.committed += 1,
                CommitOutcome::Discarded => report.discarded += 1,
                CommitOutcome::Failed => report.failed_commits += 1,
            }
        }

        Ok(())
    }

    #[instrument(skip_all, fields(rank = self.group.rank()))]
    pub fn run(mut self) -> Result<WorkerReport, GroupError> {
        let start = Instant::now();
        let mut report = WorkerReport {
            rank: self.group.rank(),
            ..WorkerReport::default()
        };

        report.scanned = self.report_completed()?;
        debug!(found = report.scanned, "Reported finished calculations");

        self.serve(&mut report)?;

        if let Some(shard) = self.shard.take() {
            if let Err(e) = shard.close() {
                warn!("Failed to close shard: {e}");
            }
        }

        info!(
            executed = report.executed,
            committed = report.committed,
            discarded = report.discarded,
            "Worker done, wall time {:.3} sec.",
            start.elapsed().as_secs_f64()
        );

        Ok(report)
    }
}
