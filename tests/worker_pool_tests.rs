#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Partition ordering and shutdown behaviour of handler groups
//!
//! # Test Coverage
//!
//! - Messages sharing a session run on one worker, in submission order
//! - A panicking handler does not stop its partition
//! - Drain processes everything queued; halt abandons what was not started
//! - Metrics agree with what handlers observed
//! - Producers racing a shutdown never lose an accepted job

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brrtmesh::dispatcher::Component;
use brrtmesh::error::EnqueueError;
use brrtmesh::group::HandlerGroup;
use brrtmesh::handler::Handler;
use brrtmesh::message::Message;
use brrtmesh::worker_pool::{GroupConfig, JobStatus, PartitionedPool, ShutdownPolicy};
use common::{app, init_runtime, Recorder, RecordingSession};

const SESSIONS: usize = 10;
const MESSAGES: usize = 1000;

#[test]
fn test_per_session_order_and_worker_affinity() {
    init_runtime();
    // (sid, message id, worker name)
    let seen: Recorder<(String, u64, String)> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::new(app);

    let record = seen.clone();
    let mut room = Handler::new("Room");
    room.add_local("move", move |_ctx, session, message| {
        let worker = may::coroutine::current()
            .name()
            .map(str::to_string)
            .unwrap_or_default();
        record.push((session.sid().to_string(), message.id, worker));
    })
    .unwrap();
    component
        .register(HandlerGroup::new(4).with_handlers([room]))
        .unwrap();
    component.init().unwrap();
    component.on_after_init().unwrap();

    let sessions: Vec<_> = (0..SESSIONS)
        .map(|i| RecordingSession::shared(&format!("sid-{i}")))
        .collect();
    let mut partitions: HashMap<String, usize> = HashMap::new();
    for i in 0..MESSAGES {
        let session = &sessions[i % SESSIONS];
        let message = Arc::new(Message::new(i as u64, "game.room.move", Vec::new()));
        let dispatch = component.process_local(Some(Arc::clone(session)), Some(message));
        let partition = dispatch.partition().expect("enqueued");
        let first = *partitions
            .entry(session.sid().to_string())
            .or_insert(partition);
        assert_eq!(first, partition, "session moved between partitions");
    }

    let reports = component.on_stop().unwrap();
    assert_eq!(reports[0].processed, MESSAGES as u64);
    assert_eq!(reports[0].abandoned, 0);

    let seen = seen.items();
    assert_eq!(seen.len(), MESSAGES);

    let mut by_session: HashMap<&str, Vec<(u64, &str)>> = HashMap::new();
    for (sid, id, worker) in &seen {
        by_session
            .entry(sid.as_str())
            .or_default()
            .push((*id, worker.as_str()));
    }
    assert_eq!(by_session.len(), SESSIONS);

    for (sid, calls) in by_session {
        let ids: Vec<u64> = calls.iter().map(|(id, _)| *id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "{sid} was reordered");

        let worker = calls[0].1;
        assert!(worker.contains("-worker-"), "unexpected worker name {worker:?}");
        assert!(
            calls.iter().all(|(_, w)| *w == worker),
            "{sid} ran on more than one worker"
        );
    }
}

#[test]
fn test_panicking_handler_keeps_partition_alive() {
    init_runtime();
    let handled: Recorder<u64> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::new(app);

    let record = handled.clone();
    let mut room = Handler::new("Room");
    room.add_local("move", move |_ctx, _session, message| {
        if message.id % 3 == 0 {
            panic!("bad move {}", message.id);
        }
        record.push(message.id);
    })
    .unwrap();
    component
        .register(HandlerGroup::new(1).with_handlers([room]))
        .unwrap();
    component.init().unwrap();
    component.on_after_init().unwrap();

    let session = RecordingSession::shared("sid");
    for id in 0..9u64 {
        let message = Arc::new(Message::new(id, "game.room.move", Vec::new()));
        assert!(component
            .process_local(Some(Arc::clone(&session)), Some(message))
            .is_enqueued());
    }
    component.on_stop().unwrap();

    assert_eq!(handled.items(), vec![1, 2, 4, 5, 7, 8]);
    let stats = component.groups().next().unwrap().metrics();
    assert_eq!(stats[0].completed, 6);
    assert_eq!(stats[0].failed, 3);
    assert_eq!(stats[0].dispatched, 9);
}

#[test]
fn test_stop_before_activation_abandons_queued_work() {
    let handled: Recorder<u64> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::new(app);

    let record = handled.clone();
    let mut room = Handler::new("Room");
    room.add_local("move", move |_c, _s, message| record.push(message.id))
        .unwrap();
    component
        .register(HandlerGroup::new(2).with_handlers([room]))
        .unwrap();
    component.init().unwrap();

    let session = RecordingSession::shared("sid");
    for id in 0..10u64 {
        let message = Arc::new(Message::new(id, "game.room.move", Vec::new()));
        component.process_local(Some(Arc::clone(&session)), Some(message));
    }

    let reports = component.on_stop().unwrap();
    assert_eq!(reports[0].processed, 0);
    assert_eq!(reports[0].abandoned, 10);
    assert!(handled.items().is_empty());
}

#[test]
fn test_halt_abandons_jobs_behind_the_running_one() {
    init_runtime();
    let handled: Recorder<u64> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::builder(app)
        .shutdown_policy(ShutdownPolicy::Halt)
        .build();

    let (release_tx, release_rx) = may::sync::mpsc::channel::<()>();
    let release_rx = Arc::new(parking_lot::Mutex::new(release_rx));

    let record = handled.clone();
    let gate = Arc::clone(&release_rx);
    let mut room = Handler::new("Room");
    room.add_local("move", move |_c, _s, message| {
        if message.id == 0 {
            // Hold the only worker until the test releases it.
            let _ = gate.lock().recv();
        }
        record.push(message.id);
    })
    .unwrap();
    component
        .register(HandlerGroup::new(1).with_handlers([room]))
        .unwrap();
    component.init().unwrap();
    component.on_after_init().unwrap();

    let session = RecordingSession::shared("sid");
    for id in 0..10u64 {
        let message = Arc::new(Message::new(id, "game.room.move", Vec::new()));
        component.process_local(Some(Arc::clone(&session)), Some(message));
    }

    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        let _ = release_tx.send(());
    });
    let reports = component.on_stop().unwrap();
    releaser.join().unwrap();

    let report = reports[0];
    assert_eq!(report.policy, ShutdownPolicy::Halt);
    assert_eq!(report.processed + report.abandoned, 10);
    assert!(report.abandoned >= 9, "{report:?}");
    assert!(handled.len() <= 1);
}

#[test]
fn test_drain_finishes_everything_queued() {
    init_runtime();
    let handled: Recorder<u64> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::new(app);

    let record = handled.clone();
    let mut room = Handler::new("Room");
    room.add_local("move", move |_c, _s, message| {
        may::coroutine::sleep(Duration::from_millis(1));
        record.push(message.id);
    })
    .unwrap();
    component
        .register(HandlerGroup::new(2).with_handlers([room]))
        .unwrap();
    component.init().unwrap();
    component.on_after_init().unwrap();

    let session = RecordingSession::shared("sid");
    for id in 0..50u64 {
        let message = Arc::new(Message::new(id, "game.room.move", Vec::new()));
        component.process_local(Some(Arc::clone(&session)), Some(message));
    }

    let reports = component.on_stop().unwrap();
    assert_eq!(reports[0].policy, ShutdownPolicy::Drain);
    assert_eq!(reports[0].processed, 50);
    assert_eq!(handled.items(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_accepted_jobs_survive_concurrent_shutdown() {
    init_runtime();
    const PRODUCERS: u64 = 4;
    const JOBS_PER_PRODUCER: u64 = 500;

    for round in 0..50 {
        let pool: PartitionedPool<u64> =
            PartitionedPool::new("race", GroupConfig::with_queues(2));
        let ran = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ran);
        pool.run(move |_partition, _job| {
            counter.fetch_add(1, Ordering::Relaxed);
            JobStatus::Completed
        })
        .unwrap();

        let (accepted, report) = std::thread::scope(|scope| {
            let producers: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let pool = &pool;
                    scope.spawn(move || {
                        let mut accepted = 0u64;
                        for i in 0..JOBS_PER_PRODUCER {
                            match pool.enqueue(((p + i) % 2) as usize, i) {
                                Ok(()) => accepted += 1,
                                Err(EnqueueError::Closed { .. }) => break,
                                Err(other) => panic!("unexpected enqueue error: {other}"),
                            }
                        }
                        accepted
                    })
                })
                .collect();

            std::thread::sleep(Duration::from_micros(200 * (round % 5)));
            let report = pool.shutdown(ShutdownPolicy::Drain);
            let accepted: u64 = producers.into_iter().map(|h| h.join().unwrap()).sum();
            (accepted, report)
        });

        assert_eq!(report.abandoned, 0, "round {round}: {report:?}");
        assert_eq!(
            accepted,
            ran.load(Ordering::Relaxed),
            "round {round}: accepted jobs were not all run"
        );
        assert_eq!(report.processed, accepted, "round {round}");
    }
}
