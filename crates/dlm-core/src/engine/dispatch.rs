//! The delivery thread.
//!
//! Sole consumer of the engine's event channel. It performs every store write
//! triggered by a state change (before the change is broadcast), owns the
//! observer and lifecycle-listener lists, coalesces progress per key and runs
//! the debounced aggregate status refresh. Callbacks therefore never run
//! concurrently with each other.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::debounce::Debounce;
use super::event::{Event, Persist};
use super::job::Job;
use super::registry::Registry;
use crate::listener::{same_ref, DownloadObserver, JobListener, StatusNotifier};
use crate::record::{DownloadInfo, DownloadState};
use crate::store::DownloadStore;

/// Events handled before pending progress is flushed.
const BATCH: usize = 256;

pub(crate) struct Dispatcher {
    rx: Receiver<Event>,
    registry: Arc<Mutex<Registry>>,
    store: Arc<dyn DownloadStore>,
    notifier: Arc<dyn StatusNotifier>,
    observers: HashMap<String, Vec<Arc<dyn DownloadObserver>>>,
    job_listeners: Vec<Arc<dyn JobListener>>,
    /// Latest (finished, total) per key not yet delivered.
    pending_progress: HashMap<String, (u64, u64)>,
    debounce: Debounce,
}

enum Flow {
    Continue,
    Stop,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: Receiver<Event>,
        registry: Arc<Mutex<Registry>>,
        store: Arc<dyn DownloadStore>,
        notifier: Arc<dyn StatusNotifier>,
        job_listeners: Vec<Arc<dyn JobListener>>,
        delay: Duration,
    ) -> Self {
        Self {
            rx,
            registry,
            store,
            notifier,
            observers: HashMap::new(),
            job_listeners,
            pending_progress: HashMap::new(),
            debounce: Debounce::new(delay),
        }
    }

    pub(crate) fn run(mut self) {
        tracing::debug!("delivery thread started");
        loop {
            let first = match self.debounce.remaining(Instant::now()) {
                Some(wait) => match self.rx.recv_timeout(wait) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            if let Some(event) = first {
                if let Flow::Stop = self.handle(event) {
                    return;
                }
                for _ in 1..BATCH {
                    match self.rx.try_recv() {
                        Ok(event) => {
                            if let Flow::Stop = self.handle(event) {
                                return;
                            }
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            self.finish();
                            return;
                        }
                    }
                }
                self.flush_all_progress();
            }

            if self.debounce.take_due(Instant::now()) {
                self.publish_status();
            }
        }
        self.finish();
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::State { job, info, persist } => {
                if !job.is_deleted() {
                    self.on_state(&job, info, persist);
                }
            }
            Event::Checkpoint { job, info, persist } => {
                if !job.is_deleted() {
                    self.persist(&info, persist);
                    if let Some(slot) = self.registry().infos.get_mut(&info.key) {
                        *slot = info;
                    }
                }
            }
            Event::Progress {
                job,
                finished,
                total,
            } => {
                if !job.is_deleted() {
                    tracing::trace!(key = %job.key(), finished, total, "progress");
                    self.pending_progress
                        .insert(job.key().to_string(), (finished, total));
                }
            }
            Event::Subscribe {
                job,
                observer,
                replay,
            } => {
                if !job.is_deleted() {
                    let key = job.key();
                    self.flush_progress(key);
                    let list = self.observers.entry(key.to_string()).or_default();
                    if !list.iter().any(|o| same_ref(o, &observer)) {
                        list.push(Arc::clone(&observer));
                    }
                    if let Some(state) = replay {
                        observer.on_state_changed(key, state);
                    }
                }
            }
            Event::Unsubscribe { key, observer } => {
                if let Some(list) = self.observers.get_mut(&key) {
                    list.retain(|o| !same_ref(o, &observer));
                    if list.is_empty() {
                        self.observers.remove(&key);
                    }
                }
            }
            Event::Notify {
                key,
                observer,
                state,
            } => observer.on_state_changed(&key, state),
            Event::Created(info) => {
                tracing::info!(key = %info.key, url = %info.url, "download created");
                for listener in &self.job_listeners {
                    listener.on_created(&info);
                }
            }
            Event::Purge(info) => self.purge(&info),
            Event::AddJobListener(listener) => {
                if !self.job_listeners.iter().any(|l| same_ref(l, &listener)) {
                    self.job_listeners.push(listener);
                }
            }
            Event::RemoveJobListener(listener) => {
                self.job_listeners.retain(|l| !same_ref(l, &listener));
            }
            Event::RefreshStatus => self.debounce.trigger(Instant::now()),
            Event::Shutdown => {
                self.finish();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_state(&mut self, job: &Arc<Job>, info: DownloadInfo, persist: Persist) {
        self.persist(&info, persist);
        let key = info.key.clone();
        let mut refresh = false;
        {
            let mut reg = self.registry();
            if let Some(slot) = reg.infos.get_mut(&key) {
                *slot = info.clone();
            }
            match info.state {
                DownloadState::Finished => {
                    reg.deactivate(job);
                    reg.reap(job);
                    refresh = true;
                }
                DownloadState::Paused | DownloadState::Failed => {
                    // A resume may already have re-queued the job.
                    if !matches!(job.state(), DownloadState::Waiting | DownloadState::Running) {
                        reg.deactivate(job);
                    }
                    refresh = true;
                }
                DownloadState::Running => refresh = true,
                DownloadState::Prepared | DownloadState::Waiting => {}
            }
        }
        if refresh {
            self.debounce.trigger(Instant::now());
        }

        self.flush_progress(&key);
        if let Some(list) = self.observers.get(&key) {
            for observer in list {
                observer.on_state_changed(&key, info.state);
            }
        }

        match info.state {
            DownloadState::Running => {
                for listener in &self.job_listeners {
                    listener.on_started(&info);
                }
            }
            DownloadState::Finished => {
                for listener in &self.job_listeners {
                    listener.on_completed(true, &info);
                }
                self.observers.remove(&key);
            }
            DownloadState::Paused | DownloadState::Failed => {
                for listener in &self.job_listeners {
                    listener.on_completed(false, &info);
                }
            }
            DownloadState::Prepared | DownloadState::Waiting => {}
        }
    }

    fn persist(&self, info: &DownloadInfo, mode: Persist) {
        let res = match mode {
            Persist::None => return,
            Persist::InsertIfAbsent => self.store.exists(info).and_then(|stored| {
                if stored {
                    Ok(())
                } else {
                    self.store.insert(info)
                }
            }),
            Persist::Upsert => self.store.exists(info).and_then(|stored| {
                if stored {
                    self.store.update(info)
                } else {
                    self.store.insert(info)
                }
            }),
            Persist::Update => self.store.update(info),
        };
        if let Err(e) = res {
            tracing::warn!(key = %info.key, state = %info.state, "store write failed: {:#}", e);
        }
    }

    fn purge(&mut self, info: &DownloadInfo) {
        if let Err(e) = self.store.delete(info) {
            tracing::warn!(key = %info.key, "failed to delete record: {:#}", e);
        }
        match fs::remove_file(&info.path) {
            Ok(()) => tracing::debug!(path = %info.path.display(), "removed download file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %info.path.display(), "failed to remove file: {}", e),
        }
        self.observers.remove(&info.key);
        self.pending_progress.remove(&info.key);
        tracing::info!(key = %info.key, "download deleted");
    }

    fn flush_progress(&mut self, key: &str) {
        if let Some((finished, total)) = self.pending_progress.remove(key) {
            if let Some(list) = self.observers.get(key) {
                for observer in list {
                    observer.on_progress_changed(key, finished, total);
                }
            }
        }
    }

    fn flush_all_progress(&mut self) {
        let pending: Vec<_> = self.pending_progress.drain().collect();
        for (key, (finished, total)) in pending {
            if let Some(list) = self.observers.get(&key) {
                for observer in list {
                    observer.on_progress_changed(&key, finished, total);
                }
            }
        }
    }

    fn publish_status(&self) {
        let summary = self.registry().summary();
        self.notifier.on_active_changed(&summary);
    }

    /// Deliver what is still pending and drop every subscriber.
    fn finish(&mut self) {
        self.flush_all_progress();
        if self.debounce.take() {
            self.publish_status();
        }
        self.job_listeners.clear();
        self.observers.clear();
        tracing::debug!("delivery thread stopped");
    }
}
