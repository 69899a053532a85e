//! Persistence contract for download records, plus the shipped backends.
//!
//! The engine calls `insert` once per record (first durable write), `update`
//! at every later checkpoint, `delete` on explicit removal and `query` exactly
//! once at startup.

mod memory;
mod sqlite;

use anyhow::Result;

use crate::record::DownloadInfo;

pub use memory::{MemoryStore, StoreCalls};
pub use sqlite::SqliteStore;

/// Row store for [`DownloadInfo`] records, keyed by `info.key`.
pub trait DownloadStore: Send + Sync {
    fn exists(&self, info: &DownloadInfo) -> Result<bool>;

    fn insert(&self, info: &DownloadInfo) -> Result<()>;

    fn update(&self, info: &DownloadInfo) -> Result<()>;

    fn delete(&self, info: &DownloadInfo) -> Result<()>;

    /// All records, oldest first.
    fn query(&self) -> Result<Vec<DownloadInfo>>;
}
