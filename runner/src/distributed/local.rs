use super::{
    group::{GroupError, ProcessGroup, Source},
    Message, Rank, Tag, MASTER,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug)]
struct Envelope {
    source: Rank,
    message: Message,
}

/// Participant of an in-process group, every rank runs on its own thread and owns nothing but
/// its channels
#[derive(Debug)]
pub struct LocalEndpoint {
    rank: Rank,
    // the master can reach every worker, a worker only the master
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    // messages that arrived before somebody asked for their tag
    pending: VecDeque<Envelope>,
}

impl ProcessGroup for LocalEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: Rank, message: Message) -> Result<(), GroupError> {
        let peer = match self.peers.get(to) {
            Some(Some(peer)) => peer,
            Some(None) => {
                return Err(GroupError::NoRoute {
                    from: self.rank,
                    to,
                })
            }
            None => {
                return Err(GroupError::UnknownRank {
                    rank: to,
                    size: self.size(),
                })
            }
        };

        peer.send(Envelope {
            source: self.rank,
            message,
        })
        .map_err(|_| GroupError::Disconnected(to))
    }

    fn receive(&mut self, from: Source, tag: Tag) -> Result<(Rank, Message), GroupError> {
        let accepts =
            |envelope: &Envelope| from.matches(envelope.source) && envelope.message.tag() == tag;

        if let Some(envelope) = self
            .pending
            .iter()
            .position(accepts)
            .and_then(|position| self.pending.remove(position))
        {
            return Ok((envelope.source, envelope.message));
        }

        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| GroupError::HungUp(self.rank))?;

            if accepts(&envelope) {
                return Ok((envelope.source, envelope.message));
            }

            debug!(
                rank = self.rank,
                source = envelope.source,
                tag = ?envelope.message.tag(),
                "Queued message for a later receive"
            );
            self.pending.push_back(envelope);
        }
    }
}

/// Fixed size group of endpoints connected by channels, rank 0 is the master
#[derive(Debug)]
pub struct LocalGroup {
    endpoints: Vec<LocalEndpoint>,
}

impl LocalGroup {
    pub fn new(size: usize) -> Result<Self, GroupError> {
        if size < 2 {
            return Err(GroupError::TooSmall(size));
        }

        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| unbounded()).unzip();

        let endpoints = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| {
                        let routed = if rank == MASTER {
                            peer != MASTER
                        } else {
                            peer == MASTER
                        };

                        routed.then(|| sender.clone())
                    })
                    .collect();

                LocalEndpoint {
                    rank,
                    peers,
                    inbox,
                    pending: VecDeque::new(),
                }
            })
            .collect();

        Ok(Self { endpoints })
    }

    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    pub fn into_endpoints(self) -> Vec<LocalEndpoint> {
        self.endpoints
    }

    /// Run `participant` once per rank, each on its own thread. Returns once every rank is
    /// done, results are in rank order.
    pub fn run<F, R>(self, participant: F) -> Result<Vec<R>, GroupError>
    where
        F: Fn(LocalEndpoint) -> R + Sync,
        R: Send,
    {
        let size = self.size();
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("rank-{index}"))
            .build()?;

        let slots: Vec<Mutex<Option<LocalEndpoint>>> = self
            .endpoints
            .into_iter()
            .map(|endpoint| Mutex::new(Some(endpoint)))
            .collect();

        // every pool thread runs the closure exactly once, its index is the rank
        let results = pool.broadcast(|context| {
            slots
                .get(context.index())
                .and_then(|slot| slot.lock().take())
                .map(&participant)
        });

        results
            .into_iter()
            .enumerate()
            .map(|(rank, result)| result.ok_or(GroupError::UnknownRank { rank, size }))
            .collect()
    }
}
