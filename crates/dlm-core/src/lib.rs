//! Resumable HTTP download engine.
//!
//! An [`Engine`] owns a registry of downloads, a transfer worker pool and a
//! single delivery thread for callbacks and persistence. Callers create
//! [`DownloadTask`] handles to start, pause, resume and delete downloads and
//! observe them through [`DownloadObserver`].

pub mod config;
pub mod engine;
pub mod listener;
pub mod logging;
pub mod naming;
pub mod record;
pub mod storage;
pub mod store;
pub mod task;
pub mod transfer;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use listener::{
    ActiveSummary, DownloadObserver, Interceptor, JobListener, LogNotifier, StatusNotifier,
};
pub use record::{derive_key, DownloadInfo, DownloadState};
pub use store::{DownloadStore, MemoryStore, SqliteStore};
pub use task::{DownloadTask, TaskBuilder, TaskError};
pub use transfer::TransferError;
