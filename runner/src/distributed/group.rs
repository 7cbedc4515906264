use super::{Message, Rank, Tag, MASTER};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("A group needs a master and at least one worker, got {0} processes")]
    TooSmall(usize),
    #[error("Rank {rank} is not part of a group of size {size}")]
    UnknownRank { rank: Rank, size: usize },
    #[error("Rank {0} is no longer reachable")]
    Disconnected(Rank),
    #[error("Rank {from} has no channel to rank {to}")]
    NoRoute { from: Rank, to: Rank },
    #[error("Every peer of rank {0} hung up while it was waiting for a message")]
    HungUp(Rank),
    #[error("Expected a {expected:?} message from rank {from}, got {received:?}")]
    Unexpected {
        expected: Tag,
        from: Rank,
        received: Message,
    },
    #[error("Failed to start the process group")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// who a receive accepts messages from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    Rank(Rank),
}

impl Source {
    pub fn matches(&self, rank: Rank) -> bool {
        match self {
            Self::Any => true,
            Self::Rank(expected) => *expected == rank,
        }
    }
}

/// Handle of one participant in a fixed size group
///
/// Messages between the same two ranks arrive in the order they were sent. A receive blocks
/// until a message with the requested tag from an accepted source arrives, messages with
/// other tags stay queued for later receives.
pub trait ProcessGroup {
    fn rank(&self) -> Rank;

    fn size(&self) -> usize;

    fn send(&self, to: Rank, message: Message) -> Result<(), GroupError>;

    fn receive(&mut self, from: Source, tag: Tag) -> Result<(Rank, Message), GroupError>;

    fn is_master(&self) -> bool {
        self.rank() == MASTER
    }

    fn workers(&self) -> usize {
        self.size().saturating_sub(1)
    }
}
