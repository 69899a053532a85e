//! Callback contracts between the engine and its collaborators.
//!
//! Every callback is invoked from the engine's single delivery thread, never
//! concurrently with another callback. Implementations should return quickly;
//! a slow callback delays every later notification.

use crate::record::{DownloadInfo, DownloadState};
use std::sync::Arc;

/// Per-download observer attached through a [`DownloadTask`](crate::task::DownloadTask).
pub trait DownloadObserver: Send + Sync {
    fn on_state_changed(&self, key: &str, state: DownloadState);

    fn on_progress_changed(&self, key: &str, finished_length: u64, content_length: u64);
}

/// Engine-wide job lifecycle listener.
pub trait JobListener: Send + Sync {
    /// A new job was registered for a never-seen key.
    fn on_created(&self, info: &DownloadInfo);

    /// A job entered `Running`.
    fn on_started(&self, info: &DownloadInfo);

    /// A run ended: `success` is true for `Finished`, false for `Paused`/`Failed`.
    fn on_completed(&self, success: bool, info: &DownloadInfo);
}

/// Hook run on the worker thread right before the first request of each run.
/// Used to refresh short-lived signed URLs; only `url` is expected to change.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, info: &mut DownloadInfo);
}

/// Aggregate "downloads in progress" view, recomputed after the debounce window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSummary {
    /// Jobs enqueued or running.
    pub active: usize,
    /// Names of the active jobs currently transferring bytes, in enqueue order.
    pub running: Vec<String>,
}

/// Receives debounced [`ActiveSummary`] updates.
pub trait StatusNotifier: Send + Sync {
    fn on_active_changed(&self, summary: &ActiveSummary);
}

/// Default notifier: logs the summary.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn on_active_changed(&self, summary: &ActiveSummary) {
        if summary.active == 0 {
            tracing::debug!("no active downloads");
        } else {
            tracing::info!(
                active = summary.active,
                running = ?summary.running,
                "{} download(s) active",
                summary.active
            );
        }
    }
}

/// Reference identity for trait objects; duplicates are detected by pointer, not value.
pub(crate) fn same_ref<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
