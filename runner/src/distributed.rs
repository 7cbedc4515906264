pub mod group;
pub mod local;
pub mod master;
pub mod worker;

/*
 * Master/worker task farm:
 * 1. every worker scans its share of the existing shards and sends the found keys (gather)
 * 2. the master removes them from the work set
 * 3. workers pull: `Ready` -> `Flag(Continue)` + `Input`, until the work set is empty
 * 4. the master answers the next `Ready` of every worker with `Flag(Stop)`
 *
 * Workers only ever see single keys, the work set never leaves the master.
 */

use crate::{executors::JobInput, keys::JobKey};

/// ordinal identity of a participant, rank 0 is always the master
pub type Rank = usize;
pub const MASTER: Rank = 0;

/// Conversations between master and workers, a receive always waits for a specific tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Gather,
    Ready,
    Flag,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFlag {
    Continue,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// keys a worker found in its share of the shards
    Completed(Vec<JobKey>),
    /// a worker asking for work
    Ready(Rank),
    Flag(JobFlag),
    Input(JobInput),
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Completed(_) => Tag::Gather,
            Self::Ready(_) => Tag::Ready,
            Self::Flag(_) => Tag::Flag,
            Self::Input(_) => Tag::Input,
        }
    }
}

#[cfg(test)]
mod master_test;
