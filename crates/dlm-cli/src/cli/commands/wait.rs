//! Blocking wait for downloads started by a command, with throttled progress.

use dlm_core::{DownloadObserver, DownloadState};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Prints progress at most every `PROGRESS_INTERVAL` per key and forwards
/// state changes to [`Waiter::wait`].
pub struct Waiter {
    states: Mutex<Sender<(String, DownloadState)>>,
    last_print: Mutex<HashMap<String, Instant>>,
}

impl Waiter {
    pub fn new() -> (Self, Receiver<(String, DownloadState)>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                states: Mutex::new(tx),
                last_print: Mutex::new(HashMap::new()),
            },
            rx,
        )
    }

    /// Block until every key in `keys` has been queued and then reached
    /// `Finished`, `Failed` or `Paused`. Returns the final state per key.
    pub fn wait(
        rx: &Receiver<(String, DownloadState)>,
        keys: &HashSet<String>,
    ) -> HashMap<String, DownloadState> {
        let mut started: HashSet<String> = HashSet::new();
        let mut done: HashMap<String, DownloadState> = HashMap::new();
        while done.len() < keys.len() {
            let Ok((key, state)) = rx.recv() else {
                break;
            };
            if !keys.contains(&key) {
                continue;
            }
            match state {
                DownloadState::Waiting | DownloadState::Running => {
                    started.insert(key);
                }
                DownloadState::Finished | DownloadState::Failed | DownloadState::Paused
                    if started.contains(&key) =>
                {
                    done.insert(key, state);
                }
                _ => {}
            }
        }
        done
    }
}

impl DownloadObserver for Waiter {
    fn on_state_changed(&self, key: &str, state: DownloadState) {
        tracing::debug!(key, %state, "state changed");
        let _ = self
            .states
            .lock()
            .unwrap()
            .send((key.to_string(), state));
    }

    fn on_progress_changed(&self, key: &str, finished: u64, total: u64) {
        let now = Instant::now();
        let mut last = self.last_print.lock().unwrap();
        let due = last
            .get(key)
            .map_or(true, |t| now.duration_since(*t) >= PROGRESS_INTERVAL);
        if !due && finished < total {
            return;
        }
        last.insert(key.to_string(), now);
        let pct = if total > 0 {
            finished as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "  {}: {:.1} / {:.1} MiB ({:.1}%)",
            key,
            finished as f64 / 1_048_576.0,
            total as f64 / 1_048_576.0,
            pct
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_paused_state_does_not_end_the_wait() {
        let (waiter, rx) = Waiter::new();
        let keys: HashSet<String> = ["1.iso".to_string()].into_iter().collect();
        waiter.on_state_changed("1.iso", DownloadState::Paused);
        waiter.on_state_changed("2.iso", DownloadState::Waiting);
        waiter.on_state_changed("1.iso", DownloadState::Waiting);
        waiter.on_state_changed("1.iso", DownloadState::Running);
        waiter.on_state_changed("1.iso", DownloadState::Finished);
        let done = Waiter::wait(&rx, &keys);
        assert_eq!(done.get("1.iso"), Some(&DownloadState::Finished));
        assert_eq!(done.len(), 1);
    }
}
