//! Messages consumed by the delivery thread.

use std::sync::Arc;

use super::job::Job;
use crate::listener::{DownloadObserver, JobListener};
use crate::record::{DownloadInfo, DownloadState};

/// Store write attached to a state change or checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Persist {
    None,
    /// First durable write of a run: insert unless the record is already stored.
    InsertIfAbsent,
    /// Insert if never stored, else update.
    Upsert,
    Update,
}

pub(crate) enum Event {
    /// A job changed state. `info` is the snapshot taken at the transition.
    State {
        job: Arc<Job>,
        info: DownloadInfo,
        persist: Persist,
    },
    /// Store write without a broadcast.
    Checkpoint {
        job: Arc<Job>,
        info: DownloadInfo,
        persist: Persist,
    },
    /// Bytes were written. Coalesced per key before delivery.
    Progress {
        job: Arc<Job>,
        finished: u64,
        total: u64,
    },
    /// Attach an observer to a live job; `replay`, when set, is delivered to it first.
    Subscribe {
        job: Arc<Job>,
        observer: Arc<dyn DownloadObserver>,
        replay: Option<DownloadState>,
    },
    Unsubscribe {
        key: String,
        observer: Arc<dyn DownloadObserver>,
    },
    /// One-off state report for a key without a live job.
    Notify {
        key: String,
        observer: Arc<dyn DownloadObserver>,
        state: DownloadState,
    },
    Created(DownloadInfo),
    /// Remove the record from the store and its file from disk.
    Purge(DownloadInfo),
    AddJobListener(Arc<dyn JobListener>),
    RemoveJobListener(Arc<dyn JobListener>),
    /// Schedule a debounced aggregate status recomputation.
    RefreshStatus,
    Shutdown,
}
