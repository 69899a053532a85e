//! In-process store. Keeps call counters so callers can check checkpoint behavior.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::DownloadStore;
use crate::record::DownloadInfo;

/// Number of calls made to each store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub exists: usize,
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
    pub query: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, DownloadInfo>>,
    exists: AtomicUsize,
    insert: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
    query: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `rows` (e.g. records left by a previous run).
    pub fn with_rows(rows: impl IntoIterator<Item = DownloadInfo>) -> Self {
        let store = Self::default();
        {
            let mut map = store.rows();
            for info in rows {
                map.insert(info.key.clone(), info);
            }
        }
        store
    }

    /// Current persisted copy of `key`, if any.
    pub fn get(&self, key: &str) -> Option<DownloadInfo> {
        self.rows().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<String, DownloadInfo>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            exists: self.exists.load(Ordering::SeqCst),
            insert: self.insert.load(Ordering::SeqCst),
            update: self.update.load(Ordering::SeqCst),
            delete: self.delete.load(Ordering::SeqCst),
            query: self.query.load(Ordering::SeqCst),
        }
    }
}

impl DownloadStore for MemoryStore {
    fn exists(&self, info: &DownloadInfo) -> Result<bool> {
        self.exists.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows().contains_key(&info.key))
    }

    fn insert(&self, info: &DownloadInfo) -> Result<()> {
        self.insert.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows();
        if rows.contains_key(&info.key) {
            anyhow::bail!("record {} already exists", info.key);
        }
        rows.insert(info.key.clone(), info.clone());
        Ok(())
    }

    fn update(&self, info: &DownloadInfo) -> Result<()> {
        self.update.fetch_add(1, Ordering::SeqCst);
        // Matches SQL semantics: updating a missing row is a no-op.
        if let Some(row) = self.rows().get_mut(&info.key) {
            *row = info.clone();
        }
        Ok(())
    }

    fn delete(&self, info: &DownloadInfo) -> Result<()> {
        self.delete.fetch_add(1, Ordering::SeqCst);
        self.rows().remove(&info.key);
        Ok(())
    }

    fn query(&self) -> Result<Vec<DownloadInfo>> {
        self.query.fetch_add(1, Ordering::SeqCst);
        let mut out: Vec<DownloadInfo> = self.rows().values().cloned().collect();
        out.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.key.cmp(&b.key)));
        Ok(out)
    }
}
