//! Integration tests: pause, resume, delete and aggregate status while
//! transfers are in flight.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::range_server::{RangeServer, ServerOptions};
use common::{body, states_until, wait_progress, Recorder, Seen, Summaries};
use dlm_core::{ActiveSummary, DownloadState, Engine, EngineConfig, MemoryStore};
use tempfile::tempdir;

fn stalled(files: Vec<(&str, Vec<u8>)>, after: usize, stall: Duration) -> RangeServer {
    RangeServer::start_with_options(
        files,
        ServerOptions {
            stall_after: Some(after),
            stall_for: stall,
            ..ServerOptions::default()
        },
    )
}

fn config(dir: &std::path::Path, max_tasks: usize) -> EngineConfig {
    EngineConfig {
        download_dir: Some(dir.to_path_buf()),
        max_tasks,
        ..EngineConfig::default()
    }
}

#[test]
fn pause_then_resume_requests_remaining_range() {
    let data = body(1000);
    let server = stalled(vec![("p.bin", data.clone())], 300, Duration::from_millis(800));
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config(dir.path(), 2), store.clone()).unwrap();

    let (recorder, rx) = Recorder::new();
    let task = engine
        .new_task(1, server.url("p.bin"), "p.bin")
        .listener(recorder)
        .create()
        .unwrap();
    task.start();
    assert_eq!(wait_progress(&rx, 300), (300, 1000));
    task.pause();
    states_until(&rx, DownloadState::Paused);

    let paused = store.get("1.bin").unwrap();
    assert_eq!(paused.state, DownloadState::Paused);
    assert_eq!(paused.finished_length, 300);

    task.resume();
    states_until(&rx, DownloadState::Finished);
    engine.shutdown();

    let requests = server.requests_for("p.bin");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].range, None);
    assert_eq!(requests[1].range.as_deref(), Some("bytes=300-999"));
    assert_eq!(std::fs::read(dir.path().join("p.bin")).unwrap(), data);
    assert_eq!(store.calls().insert, 1);
}

#[test]
fn pause_while_waiting_never_opens_a_connection() {
    let server = stalled(
        vec![("busy.bin", body(1000)), ("queued.bin", body(100))],
        100,
        Duration::from_millis(500),
    );
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config(dir.path(), 1), store.clone()).unwrap();

    let (busy_rec, busy_rx) = Recorder::new();
    let busy = engine
        .new_task(1, server.url("busy.bin"), "busy.bin")
        .listener(busy_rec)
        .create()
        .unwrap();
    busy.start();
    wait_progress(&busy_rx, 100);

    let (recorder, rx) = Recorder::new();
    let queued = engine
        .new_task(2, server.url("queued.bin"), "queued.bin")
        .listener(recorder)
        .create()
        .unwrap();
    queued.start();
    queued.pause();
    assert_eq!(
        states_until(&rx, DownloadState::Paused),
        vec![DownloadState::Prepared, DownloadState::Waiting, DownloadState::Paused]
    );

    states_until(&busy_rx, DownloadState::Finished);
    thread::sleep(Duration::from_millis(200));
    assert!(server.requests_for("queued.bin").is_empty());
    assert_eq!(engine.state("2.bin"), Some(DownloadState::Paused));
    assert_eq!(store.get("2.bin").unwrap().state, DownloadState::Paused);
    assert!(rx.try_recv().is_err(), "no further notifications for the paused job");
    engine.shutdown();
}

#[test]
fn delete_running_job_stops_silently_and_removes_everything() {
    let server = stalled(vec![("d.bin", body(1000))], 300, Duration::from_millis(500));
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config(dir.path(), 2), store.clone()).unwrap();

    let (recorder, rx) = Recorder::new();
    let mut task = engine
        .new_task(1, server.url("d.bin"), "d.bin")
        .listener(recorder)
        .create()
        .unwrap();
    task.start();
    wait_progress(&rx, 300);
    task.delete();

    assert!(!engine.has_job("1.bin"));
    assert!(engine.info("1.bin").is_none());
    assert!(!engine.is_active());

    thread::sleep(Duration::from_millis(900));
    engine.shutdown();
    let after: Vec<Seen> = rx.try_iter().collect();
    assert!(
        !after.iter().any(|s| matches!(
            s,
            Seen::State(DownloadState::Finished) | Seen::State(DownloadState::Failed)
        )),
        "unexpected terminal notification: {:?}",
        after
    );
    assert!(!dir.path().join("d.bin").exists());
    assert!(store.get("1.bin").is_none());
    assert_eq!(server.requests_for("d.bin").len(), 1);
}

#[test]
fn burst_of_enqueues_publishes_one_summary() {
    let names = ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin"];
    let files = names.iter().map(|n| (*n, body(500))).collect();
    let server = stalled(files, 100, Duration::from_millis(1500));
    let dir = tempdir().unwrap();
    let summaries = Arc::new(Summaries::default());
    let engine = Engine::builder(config(dir.path(), 1))
        .notifier(summaries.clone())
        .build()
        .unwrap();

    let (recorder, rx) = Recorder::new();
    let tasks: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut builder = engine.new_task(i as i64 + 1, server.url(name), *name);
            if i == 0 {
                builder = builder.listener(recorder.clone());
            }
            builder.create().unwrap()
        })
        .collect();
    for task in &tasks {
        task.start();
    }
    wait_progress(&rx, 100);
    thread::sleep(Duration::from_millis(300));

    assert_eq!(
        summaries.all(),
        vec![ActiveSummary {
            active: 5,
            running: vec!["a.bin".to_string()],
        }]
    );
    assert!(engine.is_active());
    assert_eq!(engine.active_summary().active, 5);
    engine.shutdown();
}

#[test]
fn late_observer_gets_current_state_replayed() {
    let server = stalled(vec![("l.bin", body(1000))], 500, Duration::from_millis(600));
    let dir = tempdir().unwrap();
    let engine = Engine::new(config(dir.path(), 2), Arc::new(MemoryStore::new())).unwrap();

    let (first, first_rx) = Recorder::new();
    let task = engine
        .new_task(1, server.url("l.bin"), "l.bin")
        .listener(first)
        .create()
        .unwrap();
    task.start();
    wait_progress(&first_rx, 500);

    let (late, late_rx) = Recorder::new();
    let info = engine.info("1.bin").unwrap();
    let mut view = engine.task_for(&info, Some(late.clone()));
    assert_eq!(
        late_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        Seen::State(DownloadState::Running)
    );
    assert_eq!(view.size(), 1000);

    // Re-attaching the same observer is a no-op; clearing stops delivery.
    let same: Arc<dyn dlm_core::DownloadObserver> = late;
    view.set_listener(Some(same));
    view.clear();
    assert!(view.listener().is_none());

    states_until(&first_rx, DownloadState::Finished);
    engine.shutdown();
    let rest: Vec<Seen> = late_rx.try_iter().collect();
    assert!(!rest.contains(&Seen::State(DownloadState::Finished)), "{:?}", rest);
}
