//! Download engine: job registry, transfer pool and delivery thread.
//!
//! Callers hold an [`Engine`] (cheap to clone) and drive downloads through
//! [`DownloadTask`] handles. All registry reads and writes happen under one
//! lock; every callback and every store write triggered by a state change runs
//! on the delivery thread.
//!
//! Lock order: registry, then a job's info.

mod control;
mod debounce;
mod dispatch;
mod event;
mod job;
mod pool;
mod registry;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::listener::{
    ActiveSummary, DownloadObserver, Interceptor, JobListener, LogNotifier, StatusNotifier,
};
use crate::record::{DownloadInfo, DownloadState};
use crate::store::{DownloadStore, MemoryStore};
use crate::task::{DownloadTask, TaskBuilder};
use crate::transfer::TransferSettings;

use dispatch::Dispatcher;
use event::Event;
use job::Job;
use pool::{TransferContext, WorkerPool};
use registry::Registry;

/// Shared handle to a running engine. Stops when [`Engine::shutdown`] is called
/// or the last clone is dropped.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

struct Shared {
    config: EngineConfig,
    download_dir: PathBuf,
    registry: Arc<Mutex<Registry>>,
    events: Sender<Event>,
    ctx: Arc<TransferContext>,
    pool: WorkerPool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// Configures collaborators before the engine starts.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn DownloadStore>>,
    notifier: Arc<dyn StatusNotifier>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    job_listeners: Vec<Arc<dyn JobListener>>,
}

impl EngineBuilder {
    /// Persistence backend. Defaults to an in-process [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn DownloadStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Receiver of debounced aggregate updates. Defaults to [`LogNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn job_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.job_listeners.push(listener);
        self
    }

    /// Load every persisted record and start the worker and delivery threads.
    pub fn build(self) -> Result<Engine> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let records = store.query().context("load download records")?;
        let loaded = records.len();

        let (events, rx) = mpsc::channel();
        let registry = Arc::new(Mutex::new(Registry::load(records, &events)));
        let ctx = Arc::new(TransferContext::new(
            TransferSettings::from_config(&self.config),
            self.interceptors,
        ));
        let pool = WorkerPool::start(self.config.pool_size(), Arc::clone(&ctx))
            .context("start transfer workers")?;

        let dispatcher = Dispatcher::new(
            rx,
            Arc::clone(&registry),
            store,
            self.notifier,
            self.job_listeners,
            self.config.notify_delay(),
        );
        let handle = match thread::Builder::new()
            .name("dlm-delivery".to_string())
            .spawn(move || dispatcher.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                pool.shutdown();
                return Err(e).context("start delivery thread");
            }
        };

        let download_dir = self.config.resolved_download_dir();
        tracing::info!(
            records = loaded,
            workers = self.config.pool_size(),
            dir = %download_dir.display(),
            "engine started"
        );
        Ok(Engine {
            shared: Arc::new(Shared {
                config: self.config,
                download_dir,
                registry,
                events,
                ctx,
                pool,
                dispatcher: Mutex::new(Some(handle)),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            store: None,
            notifier: Arc::new(LogNotifier),
            interceptors: Vec::new(),
            job_listeners: Vec::new(),
        }
    }

    pub fn new(config: EngineConfig, store: Arc<dyn DownloadStore>) -> Result<Self> {
        Self::builder(config).store(store).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Directory new downloads are saved to.
    pub fn download_dir(&self) -> &Path {
        &self.shared.download_dir
    }

    /// Start building a handle for download `id`.
    pub fn new_task(&self, id: i64, url: impl Into<String>, name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(self.clone(), id, url.into(), name.into())
    }

    /// Handle for an existing record, attaching `observer` if given.
    pub fn task_for(
        &self,
        info: &DownloadInfo,
        observer: Option<Arc<dyn DownloadObserver>>,
    ) -> DownloadTask {
        DownloadTask::from_info(self.clone(), info, observer)
    }

    /// A handle for every unfinished download, oldest first.
    pub fn all_tasks(&self) -> Vec<DownloadTask> {
        let snapshots: Vec<DownloadInfo> = self
            .registry()
            .jobs
            .values()
            .map(|job| job.snapshot())
            .collect();
        let mut tasks: Vec<DownloadTask> = snapshots
            .iter()
            .map(|info| DownloadTask::from_info(self.clone(), info, None))
            .collect();
        tasks.sort_by(|a, b| a.compare_create_time(b).then_with(|| a.key().cmp(b.key())));
        tasks
    }

    /// Every known record, finished ones included, oldest first. Live jobs
    /// report their current progress.
    pub fn all_info(&self) -> Vec<DownloadInfo> {
        let mut all: Vec<DownloadInfo> = {
            let reg = self.registry();
            reg.infos
                .iter()
                .map(|(key, info)| match reg.jobs.get(key) {
                    Some(job) => job.snapshot(),
                    None => info.clone(),
                })
                .collect()
        };
        all.sort_by(|a, b| {
            a.create_time
                .cmp(&b.create_time)
                .then_with(|| a.key.cmp(&b.key))
        });
        all
    }

    /// Current record for `key`.
    pub fn info(&self, key: &str) -> Option<DownloadInfo> {
        let reg = self.registry();
        match reg.jobs.get(key) {
            Some(job) => Some(job.snapshot()),
            None => reg.infos.get(key).cloned(),
        }
    }

    pub fn state(&self, key: &str) -> Option<DownloadState> {
        let reg = self.registry();
        match reg.jobs.get(key) {
            Some(job) => Some(job.state()),
            None => reg.infos.get(key).map(|info| info.state),
        }
    }

    /// Whether an unfinished job is registered for `key`.
    pub fn has_job(&self, key: &str) -> bool {
        self.registry().jobs.contains_key(key)
    }

    /// Whether any download is queued or running.
    pub fn is_active(&self) -> bool {
        !self.registry().active.is_empty()
    }

    pub fn active_summary(&self) -> ActiveSummary {
        self.registry().summary()
    }

    /// Runs before the first request of every later transfer run.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.shared.ctx.add_interceptor(interceptor);
    }

    pub fn add_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.send(Event::AddJobListener(listener));
    }

    pub fn remove_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.send(Event::RemoveJobListener(listener));
    }

    /// Delete the download described by `info`: record, job and file.
    pub fn delete_info(&self, info: &DownloadInfo) {
        self.delete(&info.key);
    }

    /// Pause live jobs, drain the worker pool and stop the delivery thread.
    /// Later calls are no-ops.
    pub fn shutdown(&self) {
        self.shared.stop();
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared.registry()
    }

    fn send(&self, event: Event) {
        if self.shared.events.send(event).is_err() {
            tracing::debug!("engine stopped; event dropped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Report the current state of `key` to `observer` and, for a live job,
    /// keep it subscribed. Returns the known size and create time.
    pub(crate) fn prepare(
        &self,
        key: &str,
        observer: Option<Arc<dyn DownloadObserver>>,
    ) -> Option<(u64, i64)> {
        let reg = self.registry();
        let Some(info) = reg.infos.get(key) else {
            if let Some(observer) = observer {
                self.send(Event::Notify {
                    key: key.to_string(),
                    observer,
                    state: DownloadState::Prepared,
                });
            }
            return None;
        };
        match reg.jobs.get(key) {
            Some(job) => {
                let live = job.snapshot();
                if let Some(observer) = observer {
                    job.subscribe(observer, true);
                }
                Some((live.content_length, live.create_time))
            }
            None => {
                if let Some(observer) = observer {
                    self.send(Event::Notify {
                        key: key.to_string(),
                        observer,
                        state: info.state,
                    });
                }
                Some((info.content_length, info.create_time))
            }
        }
    }

    pub(crate) fn enqueue(&self, task: &DownloadTask) {
        if self.is_stopped() {
            tracing::debug!(key = %task.key(), "engine stopped; enqueue ignored");
            return;
        }
        {
            let mut reg = self.registry();
            if let Some(job) = reg.job(task.key()) {
                if job.resume(&self.shared.pool) {
                    reg.activate(&job);
                }
            } else if reg.infos.contains_key(task.key()) {
                tracing::debug!(key = %task.key(), "already finished; enqueue ignored");
            } else {
                let info = task.to_info();
                let job = Job::new(info.clone(), self.shared.events.clone());
                reg.infos.insert(info.key.clone(), info.clone());
                reg.jobs.insert(info.key.clone(), Arc::clone(&job));
                self.send(Event::Created(info));
                if let Some(observer) = task.listener() {
                    job.subscribe(Arc::clone(observer), false);
                }
                job.resume(&self.shared.pool);
                reg.activate(&job);
            }
        }
        self.send(Event::RefreshStatus);
    }

    pub(crate) fn pause(&self, key: &str) {
        if let Some(job) = self.registry().job(key) {
            job.pause();
        }
    }

    pub(crate) fn resume(&self, key: &str) {
        if self.is_stopped() {
            return;
        }
        let resumed = {
            let mut reg = self.registry();
            match reg.job(key) {
                Some(job) if job.resume(&self.shared.pool) => {
                    reg.activate(&job);
                    true
                }
                _ => false,
            }
        };
        if resumed {
            self.send(Event::RefreshStatus);
        }
    }

    pub(crate) fn delete(&self, key: &str) {
        let (record, was_active) = {
            let mut reg = self.registry();
            let info = reg.infos.remove(key);
            match reg.jobs.remove(key) {
                Some(job) => {
                    job.delete();
                    let was_active = reg.deactivate(&job);
                    (Some(job.snapshot()), was_active)
                }
                None => (info, false),
            }
        };
        let Some(record) = record else {
            tracing::debug!(key, "nothing to delete");
            return;
        };
        self.send(Event::Purge(record));
        if was_active {
            self.send(Event::RefreshStatus);
        }
    }

    pub(crate) fn add_listener(&self, key: &str, observer: Arc<dyn DownloadObserver>) {
        self.prepare(key, Some(observer));
    }

    pub(crate) fn remove_listener(&self, key: &str, observer: Arc<dyn DownloadObserver>) {
        self.send(Event::Unsubscribe {
            key: key.to_string(),
            observer,
        });
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("download_dir", &self.shared.download_dir)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let live: Vec<Arc<Job>> = self.registry().jobs.values().cloned().collect();
        for job in &live {
            job.pause();
        }
        self.pool.shutdown();
        let _ = self.events.send(Event::Shutdown);

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("delivery thread panicked");
            }
        }
        self.ctx.clear_interceptors();
        tracing::info!("engine stopped");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop();
    }
}
