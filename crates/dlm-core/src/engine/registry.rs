//! Job and record registries.
//!
//! Invariants: every key in `jobs` is in `infos`; every job in `active` is the
//! job registered under its key in `jobs`; a job appears in `active` at most once.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::event::Event;
use super::job::Job;
use crate::listener::ActiveSummary;
use crate::record::{DownloadInfo, DownloadState};

#[derive(Default)]
pub(crate) struct Registry {
    /// Non-terminal jobs by key.
    pub(crate) jobs: HashMap<String, Arc<Job>>,
    /// Every known record, finished ones included.
    pub(crate) infos: HashMap<String, DownloadInfo>,
    /// Enqueued or running jobs, in enqueue order.
    pub(crate) active: Vec<Arc<Job>>,
}

impl Registry {
    /// Rebuild from persisted records. Finished records go to `infos` only; every
    /// other record gets an idle job. A record left `Running`/`Waiting` by a crash
    /// comes back as `Paused`.
    pub(crate) fn load(records: Vec<DownloadInfo>, events: &Sender<Event>) -> Self {
        let mut reg = Registry::default();
        for mut info in records {
            if matches!(info.state, DownloadState::Running | DownloadState::Waiting) {
                tracing::debug!(key = %info.key, "recovering interrupted download as paused");
                info.state = DownloadState::Paused;
            }
            let key = info.key.clone();
            if !info.is_finished() {
                reg.jobs
                    .insert(key.clone(), Job::new(info.clone(), events.clone()));
            }
            reg.infos.insert(key, info);
        }
        reg
    }

    pub(crate) fn job(&self, key: &str) -> Option<Arc<Job>> {
        self.jobs.get(key).cloned()
    }

    /// Add to `active` unless already there.
    pub(crate) fn activate(&mut self, job: &Arc<Job>) {
        if !self.active.iter().any(|j| Arc::ptr_eq(j, job)) {
            self.active.push(Arc::clone(job));
        }
    }

    /// Remove from `active`; true if it was there.
    pub(crate) fn deactivate(&mut self, job: &Arc<Job>) -> bool {
        let before = self.active.len();
        self.active.retain(|j| !Arc::ptr_eq(j, job));
        self.active.len() != before
    }

    /// Drop `key` from `jobs` only if it still maps to `job`.
    pub(crate) fn reap(&mut self, job: &Arc<Job>) -> bool {
        match self.jobs.get(job.key()) {
            Some(current) if Arc::ptr_eq(current, job) => {
                self.jobs.remove(job.key());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn summary(&self) -> ActiveSummary {
        ActiveSummary {
            active: self.active.len(),
            running: self
                .active
                .iter()
                .filter(|j| j.is_running())
                .map(|j| j.name())
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for key in self.jobs.keys() {
            assert!(self.infos.contains_key(key), "job {} without record", key);
        }
        for (i, job) in self.active.iter().enumerate() {
            let registered = self
                .jobs
                .get(job.key())
                .unwrap_or_else(|| panic!("active job {} not registered", job.key()));
            assert!(Arc::ptr_eq(registered, job));
            assert!(
                !self.active[i + 1..].iter().any(|j| Arc::ptr_eq(j, job)),
                "job {} active twice",
                job.key()
            );
        }
    }
}
