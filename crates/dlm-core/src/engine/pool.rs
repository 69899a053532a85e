//! Bounded transfer pool.
//!
//! A driver thread owns a current-thread tokio runtime. Each job's blocking
//! curl run goes through `spawn_blocking`; a `JoinSet` caps how many are in
//! flight.

use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinSet};

use super::job::Job;
use crate::listener::Interceptor;
use crate::transfer::TransferSettings;

/// What every worker needs to run a job.
#[derive(Default)]
pub(crate) struct TransferContext {
    pub(crate) settings: TransferSettings,
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl TransferContext {
    pub(crate) fn new(settings: TransferSettings, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            settings,
            interceptors: RwLock::new(interceptors),
        }
    }

    pub(crate) fn interceptors(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Interceptor>>> {
        self.interceptors.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub(crate) fn clear_interceptors(&self) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

thread_local! {
    static ON_POOL: Cell<bool> = const { Cell::new(false) };
}

/// Runs queued jobs on tokio's blocking pool, at most `size` at once, started
/// in submission order.
pub(crate) struct WorkerPool {
    queue: Mutex<Option<UnboundedSender<Arc<Job>>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn start(size: usize, ctx: Arc<TransferContext>) -> std::io::Result<Self> {
        let size = size.max(1);
        let rt = tokio::runtime::Builder::new_current_thread()
            .thread_name("dlm-worker")
            .max_blocking_threads(size)
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = thread::Builder::new()
            .name("dlm-pool".to_string())
            .spawn(move || rt.block_on(drive(rx, ctx, size)))?;
        tracing::debug!(workers = size, "transfer pool started");
        Ok(Self {
            queue: Mutex::new(Some(tx)),
            driver: Mutex::new(Some(driver)),
        })
    }

    /// False once the pool is shut down.
    pub(crate) fn submit(&self, job: Arc<Job>) -> bool {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait until every queued and running job is done.
    /// Idempotent. Called from a job itself it only closes the queue.
    pub(crate) fn shutdown(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(driver) = driver else {
            return;
        };
        if ON_POOL.with(Cell::get) {
            tracing::debug!("pool shutdown from a running job; not waiting");
            return;
        }
        if driver.join().is_err() {
            tracing::warn!("transfer pool driver panicked");
        }
    }
}

/// Same shape as a bounded `JoinSet` scheduler: keep up to `max` runs in
/// flight, take the next job when one finishes, drain on close.
async fn drive(mut rx: UnboundedReceiver<Arc<Job>>, ctx: Arc<TransferContext>, max: usize) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            next = rx.recv(), if running.len() < max => {
                let Some(job) = next else { break };
                let ctx = Arc::clone(&ctx);
                running.spawn_blocking(move || run_on_pool(&job, &ctx));
            }
            Some(res) = running.join_next(), if !running.is_empty() => log_join(res),
        }
    }
    while let Some(res) = running.join_next().await {
        log_join(res);
    }
    tracing::debug!("transfer pool drained");
}

fn run_on_pool(job: &Arc<Job>, ctx: &TransferContext) {
    ON_POOL.with(|flag| flag.set(true));
    job.run(ctx);
    ON_POOL.with(|flag| flag.set(false));
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(e) = res {
        tracing::warn!("transfer run aborted: {}", e);
    }
}
