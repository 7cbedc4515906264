use super::{
    group::{GroupError, ProcessGroup, Source},
    JobFlag, Message, Tag,
};
use crate::{
    config::DockingParams,
    executors::JobInput,
    keys::JobKey,
    keyspace::{self, WorkSet},
};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// What a master did during one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    // keys dropped from the work set because a shard already holds them
    pub completed_before: usize,
    // keys handed out, in dispatch order
    pub dispatched: Vec<JobKey>,
    // stop signals delivered
    pub stops: usize,
}

/// Coordinator of a run, owns the work set and answers work requests
#[derive(Debug)]
pub struct Master<G> {
    group: G,
    params: DockingParams,
}

impl<G: ProcessGroup> Master<G> {
    pub fn new(group: G, params: DockingParams) -> Self {
        Self { group, params }
    }

    /// Collect the keys every worker found in its share of the shards and drop them from `work`.
    /// Blocks until each worker has reported exactly once.
    pub fn gather_completed(&mut self, work: &mut WorkSet) -> Result<usize, GroupError> {
        let mut removed = 0;

        for _ in 0..self.group.workers() {
            match self.group.receive(Source::Any, Tag::Gather)? {
                (_, Message::Completed(keys)) => {
                    removed += keyspace::remove_completed(work, keys);
                }
                (from, received) => {
                    return Err(GroupError::Unexpected {
                        expected: Tag::Gather,
                        from,
                        received,
                    })
                }
            }
        }

        Ok(removed)
    }

    /// wait for the next worker asking for work, whoever comes first
    fn next_ready(&mut self) -> Result<usize, GroupError> {
        match self.group.receive(Source::Any, Tag::Ready)? {
            (_, Message::Ready(rank)) => Ok(rank),
            (from, received) => Err(GroupError::Unexpected {
                expected: Tag::Ready,
                from,
                received,
            }),
        }
    }

    /// Hand out every key once. A key counts as done the moment it is sent, a worker that dies
    /// takes its key with it until the next resume.
    pub fn dispatch(&mut self, work: WorkSet) -> Result<Vec<JobKey>, GroupError> {
        let total = work.len();
        let mut dispatched = Vec::with_capacity(total);

        for key in work {
            let free = loop {
                let rank = self.next_ready()?;

                match self.group.send(rank, Message::Flag(JobFlag::Continue)) {
                    Ok(()) => break rank,
                    Err(error) => warn!(rank = rank, "Worker vanished before it got work: {error}"),
                }
            };

            info!(
                rank = free,
                key = %key,
                "At process {free} working on key {key} ({}/{total})",
                dispatched.len() + 1
            );

            let input = JobInput {
                params: self.params.clone(),
                key: key.clone(),
            };
            if let Err(error) = self.group.send(free, Message::Input(input)) {
                warn!(rank = free, key = %key, "Lost key, worker vanished: {error}");
            }

            dispatched.push(key);
        }

        Ok(dispatched)
    }

    /// Answer the next request of every worker with a stop signal. Workers that can no longer
    /// be reached are skipped, a lost worker never blocks the shutdown of the others.
    pub fn drain(&mut self) -> usize {
        let mut stops = 0;

        for _ in 0..self.group.workers() {
            let rank = match self.next_ready() {
                Ok(rank) => rank,
                Err(error) => {
                    warn!(
                        stopped = stops,
                        workers = self.group.workers(),
                        "Stopped draining workers: {error}"
                    );
                    break;
                }
            };

            match self.group.send(rank, Message::Flag(JobFlag::Stop)) {
                Ok(()) => stops += 1,
                Err(error) => warn!(rank = rank, "Failed to stop worker: {error}"),
            }
        }

        stops
    }

    /// gather checkpoints, dispatch the remaining work and stop every worker
    #[instrument(skip_all, fields(rank = self.group.rank()))]
    pub fn run(mut self, mut work: WorkSet) -> Result<DispatchReport, GroupError> {
        let start = Instant::now();
        info!(
            processes = self.group.size(),
            keys = work.len(),
            "Master started"
        );

        let completed_before = self.gather_completed(&mut work)?;
        info!(
            completed = completed_before,
            remaining = work.len(),
            "Found all finished calculations"
        );

        self.params.resolve_cpu(self.group.workers());
        let dispatched = self.dispatch(work)?;
        let stops = self.drain();

        info!(
            dispatched = dispatched.len(),
            stops = stops,
            "Master done, wall time {:.3} sec.",
            start.elapsed().as_secs_f64()
        );

        Ok(DispatchReport {
            completed_before,
            dispatched,
            stops,
        })
    }
}
