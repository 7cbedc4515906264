use super::{
    group::{GroupError, ProcessGroup, Source},
    local::{LocalEndpoint, LocalGroup},
    master::{DispatchReport, Master},
    JobFlag, Message, Tag, MASTER,
};
use crate::{
    config::{cpu_share, DockingParams},
    keys::JobKey,
    keyspace::WorkSet,
};
use std::{
    collections::HashSet,
    thread::{self, JoinHandle},
};

fn key(raw: &str) -> JobKey {
    raw.parse().unwrap()
}

fn work(raw: &[&str]) -> WorkSet {
    raw.iter().map(|raw| key(raw)).collect()
}

fn spawn_master(
    processes: usize,
    work: WorkSet,
    params: DockingParams,
) -> (
    JoinHandle<Result<DispatchReport, GroupError>>,
    Vec<LocalEndpoint>,
) {
    let mut endpoints = LocalGroup::new(processes).unwrap().into_endpoints();
    let master = endpoints.remove(0);
    let handle = thread::spawn(move || Master::new(master, params).run(work));

    (handle, endpoints)
}

/// ask for work once, `None` means the worker was stopped
fn pull(worker: &mut LocalEndpoint) -> Option<JobKey> {
    worker
        .send(MASTER, Message::Ready(worker.rank()))
        .unwrap();

    match worker.receive(Source::Rank(MASTER), Tag::Flag).unwrap() {
        (_, Message::Flag(JobFlag::Stop)) => None,
        (_, Message::Flag(JobFlag::Continue)) => {
            match worker.receive(Source::Rank(MASTER), Tag::Input).unwrap() {
                (_, Message::Input(input)) => Some(input.key),
                other => panic!("expected input, got {other:?}"),
            }
        }
        other => panic!("expected flag, got {other:?}"),
    }
}

#[test]
pub fn resume_only_dispatches_remaining_keys() {
    let (master, mut workers) = spawn_master(
        3,
        work(&["R1/L1", "R2/L1", "R3/L1"]),
        DockingParams::default(),
    );

    workers[0]
        .send(
            MASTER,
            Message::Completed(vec![key("R1/L1"), key("R9/L9")]),
        )
        .unwrap();
    workers[1].send(MASTER, Message::Completed(Vec::new())).unwrap();

    let mut received = Vec::new();
    while let Some(key) = pull(&mut workers[0]) {
        received.push(key);
    }
    assert_eq!(pull(&mut workers[1]), None);

    let report = master.join().unwrap().unwrap();
    let received: HashSet<JobKey> = received.into_iter().collect();

    assert_eq!(report.completed_before, 1);
    assert_eq!(received, work(&["R2/L1", "R3/L1"]));
    assert_eq!(report.dispatched.len(), 2);
    assert_eq!(report.stops, 2);
}

#[test]
pub fn every_key_goes_to_exactly_one_worker() {
    let keys: Vec<String> = (0..20).map(|i| format!("R{i}/L1")).collect();
    let all: WorkSet = keys.iter().map(|raw| key(raw)).collect();
    let (master, mut workers) = spawn_master(4, all.clone(), DockingParams::default());

    for worker in workers.iter() {
        worker.send(MASTER, Message::Completed(Vec::new())).unwrap();
    }

    // alternate between workers until each one was stopped
    let mut received = Vec::new();
    let mut stopped = vec![false; workers.len()];
    while stopped.iter().any(|stopped| !stopped) {
        for (index, worker) in workers.iter_mut().enumerate() {
            if stopped[index] {
                continue;
            }

            match pull(worker) {
                Some(key) => received.push(key),
                None => stopped[index] = true,
            }
        }
    }

    let report = master.join().unwrap().unwrap();
    let unique: HashSet<JobKey> = received.iter().cloned().collect();

    assert_eq!(received.len(), 20);
    assert_eq!(unique, all);
    assert_eq!(report.stops, 3);
}

#[test]
pub fn dispatched_input_carries_the_configuration() {
    let params = DockingParams {
        score_cutoff: Some(-7.0),
        exhaustiveness: 32,
        cpu: 0,
        ..DockingParams::default()
    };
    let (master, mut workers) = spawn_master(2, work(&["R1/L1"]), params);
    let worker = &mut workers[0];

    worker.send(MASTER, Message::Completed(Vec::new())).unwrap();
    worker.send(MASTER, Message::Ready(1)).unwrap();
    assert_eq!(
        worker.receive(Source::Rank(MASTER), Tag::Flag).unwrap().1,
        Message::Flag(JobFlag::Continue)
    );

    match worker.receive(Source::Rank(MASTER), Tag::Input).unwrap().1 {
        Message::Input(input) => {
            assert_eq!(input.key, key("R1/L1"));
            assert_eq!(input.params.score_cutoff, Some(-7.0));
            assert_eq!(input.params.exhaustiveness, 32);
            assert!(input.params.cpu >= 1);
        }
        other => panic!("expected input, got {other:?}"),
    }

    assert_eq!(pull(worker), None);
    assert_eq!(master.join().unwrap().unwrap().stops, 1);
}

#[test]
pub fn detected_cores_are_shared_between_workers() {
    let (master, mut workers) = spawn_master(5, work(&["R1/L1"]), DockingParams::default());

    for worker in workers.iter() {
        worker.send(MASTER, Message::Completed(Vec::new())).unwrap();
    }

    worker_input_cpu(&mut workers[0], 4);
    for worker in workers.iter_mut() {
        assert_eq!(pull(worker), None);
    }
    assert_eq!(master.join().unwrap().unwrap().stops, 4);
}

/// pull the single job of a run and check its core count against a group of `workers`
fn worker_input_cpu(worker: &mut LocalEndpoint, workers: usize) {
    let available = std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1);

    worker.send(MASTER, Message::Ready(worker.rank())).unwrap();
    worker.receive(Source::Rank(MASTER), Tag::Flag).unwrap();

    match worker.receive(Source::Rank(MASTER), Tag::Input).unwrap().1 {
        Message::Input(input) => {
            assert_eq!(input.params.cpu, cpu_share(available, workers));
            assert!(input.params.cpu * workers <= available.max(workers));
        }
        other => panic!("expected input, got {other:?}"),
    }
}

#[test]
pub fn nothing_left_stops_every_worker() {
    let (master, mut workers) = spawn_master(3, work(&["R1/L1"]), DockingParams::default());

    workers[0]
        .send(MASTER, Message::Completed(vec![key("R1/L1")]))
        .unwrap();
    workers[1].send(MASTER, Message::Completed(Vec::new())).unwrap();

    assert_eq!(pull(&mut workers[1]), None);
    assert_eq!(pull(&mut workers[0]), None);

    let report = master.join().unwrap().unwrap();
    assert!(report.dispatched.is_empty());
    assert_eq!(report.stops, 2);
}

#[test]
pub fn lost_worker_does_not_block_shutdown() {
    let (master, mut workers) = spawn_master(3, work(&["R1/L1", "R2/L1"]), DockingParams::default());

    for worker in workers.iter() {
        worker.send(MASTER, Message::Completed(Vec::new())).unwrap();
    }

    // the second worker crashes right after the checkpoint scan
    let survivor = workers.remove(0);
    drop(workers);
    let mut survivor = survivor;

    assert!(pull(&mut survivor).is_some());
    assert!(pull(&mut survivor).is_some());
    assert_eq!(pull(&mut survivor), None);
    drop(survivor);

    let report = master.join().unwrap().unwrap();
    assert_eq!(report.dispatched.len(), 2);
    assert_eq!(report.stops, 1);
}

#[test]
pub fn dispatch_fails_without_any_worker() {
    let (master, mut workers) = spawn_master(2, work(&["R1/L1"]), DockingParams::default());

    workers[0]
        .send(MASTER, Message::Completed(Vec::new()))
        .unwrap();
    drop(workers);

    assert!(matches!(
        master.join().unwrap(),
        Err(GroupError::HungUp(MASTER))
    ));
}
