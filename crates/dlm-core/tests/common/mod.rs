//! Shared integration-test helpers.

#![allow(dead_code)]

pub mod range_server;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dlm_core::{
    ActiveSummary, DownloadInfo, DownloadObserver, DownloadState, JobListener, StatusNotifier,
};

pub const WAIT: Duration = Duration::from_secs(10);

/// Deterministic test body: bytes cycle through 0..251.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    State(DownloadState),
    Progress(u64, u64),
}

/// Observer that forwards every callback to a channel.
pub struct Recorder(Mutex<Sender<Seen>>);

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self(Mutex::new(tx))), rx)
    }
}

impl DownloadObserver for Recorder {
    fn on_state_changed(&self, _key: &str, state: DownloadState) {
        let _ = self.0.lock().unwrap().send(Seen::State(state));
    }

    fn on_progress_changed(&self, _key: &str, finished: u64, total: u64) {
        let _ = self.0.lock().unwrap().send(Seen::Progress(finished, total));
    }
}

/// Collect states until `last` is seen (inclusive). Panics on timeout.
pub fn states_until(rx: &Receiver<Seen>, last: DownloadState) -> Vec<DownloadState> {
    let deadline = Instant::now() + WAIT;
    let mut out = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(Seen::State(s)) => {
                out.push(s);
                if s == last {
                    return out;
                }
            }
            Ok(Seen::Progress(..)) => {}
            Err(_) => panic!("timed out waiting for {:?}; saw {:?}", last, out),
        }
    }
}

/// Block until reported progress reaches `at_least` bytes.
pub fn wait_progress(rx: &Receiver<Seen>, at_least: u64) -> (u64, u64) {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(Seen::Progress(finished, total)) if finished >= at_least => return (finished, total),
            Ok(_) => {}
            Err(_) => panic!("timed out waiting for {} bytes", at_least),
        }
    }
}

/// Lifecycle callbacks as strings, e.g. `created 1.bin`, `completed 1.bin true`.
#[derive(Default)]
pub struct Lifecycle(pub Mutex<Vec<String>>);

impl Lifecycle {
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl JobListener for Lifecycle {
    fn on_created(&self, info: &DownloadInfo) {
        self.0.lock().unwrap().push(format!("created {}", info.key));
    }

    fn on_started(&self, info: &DownloadInfo) {
        self.0.lock().unwrap().push(format!("started {}", info.key));
    }

    fn on_completed(&self, success: bool, info: &DownloadInfo) {
        self.0
            .lock()
            .unwrap()
            .push(format!("completed {} {}", info.key, success));
    }
}

/// Notifier that keeps every summary it receives.
#[derive(Default)]
pub struct Summaries(pub Mutex<Vec<ActiveSummary>>);

impl Summaries {
    pub fn all(&self) -> Vec<ActiveSummary> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusNotifier for Summaries {
    fn on_active_changed(&self, summary: &ActiveSummary) {
        self.0.lock().unwrap().push(summary.clone());
    }
}
