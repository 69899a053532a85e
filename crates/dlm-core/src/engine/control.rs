//! Cooperative stop flags shared between the registry side and a job's worker.
//!
//! The registry side sets `paused`/`deleted`; the worker polls them once per
//! chunk. `queued` records whether the job currently sits in the pool queue so
//! a resume never submits it twice.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct JobControl {
    paused: AtomicBool,
    deleted: AtomicBool,
    queued: AtomicBool,
}

impl JobControl {
    pub(crate) fn request_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_pause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn request_delete(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// True if the byte loop should stop at the next chunk boundary.
    pub(crate) fn should_stop(&self) -> bool {
        self.is_paused() || self.is_deleted()
    }

    /// Mark as queued; returns false if it already was.
    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_dequeued(&self) {
        self.queued.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.queued.load(Ordering::SeqCst)
    }
}
