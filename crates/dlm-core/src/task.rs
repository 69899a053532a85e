//! Caller-facing download handles.
//!
//! A [`DownloadTask`] is a lightweight reference to one download key. Several
//! handles may point at the same key; each carries its own optional observer
//! and forwards every operation to the [`Engine`].

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::engine::Engine;
use crate::listener::{same_ref, DownloadObserver};
use crate::naming::is_plain_name;
use crate::record::{derive_key, unix_millis, DownloadInfo, DownloadState};

/// Rejected handle construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("download url is empty")]
    EmptyUrl,
    #[error("download name is empty")]
    EmptyName,
    #[error("download name is not a plain file name: {0}")]
    InvalidName(String),
}

/// Builder returned by [`Engine::new_task`].
pub struct TaskBuilder {
    engine: Engine,
    id: i64,
    url: String,
    name: String,
    source: Option<String>,
    extras: Option<String>,
    listener: Option<Arc<dyn DownloadObserver>>,
}

impl TaskBuilder {
    pub(crate) fn new(engine: Engine, id: i64, url: String, name: String) -> Self {
        Self {
            engine,
            id,
            url,
            name,
            source: None,
            extras: None,
            listener: None,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Opaque string stored with the record and handed back unchanged.
    pub fn extras(mut self, extras: impl Into<String>) -> Self {
        self.extras = Some(extras.into());
        self
    }

    pub fn listener(mut self, listener: Arc<dyn DownloadObserver>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Validate inputs and register the observer with the engine. The observer
    /// immediately receives the key's current state.
    pub fn create(self) -> Result<DownloadTask, TaskError> {
        if self.url.trim().is_empty() {
            return Err(TaskError::EmptyUrl);
        }
        if self.name.trim().is_empty() {
            return Err(TaskError::EmptyName);
        }
        if !is_plain_name(&self.name) {
            return Err(TaskError::InvalidName(self.name));
        }
        let key = derive_key(self.id, &self.name);
        let path = self.engine.download_dir().join(&self.name);
        let mut task = DownloadTask {
            engine: self.engine,
            id: self.id,
            key,
            url: self.url,
            name: self.name,
            path,
            source: self.source,
            extras: self.extras,
            size: 0,
            create_time: unix_millis(),
            listener: self.listener,
        };
        task.prepare();
        Ok(task)
    }
}

pub struct DownloadTask {
    engine: Engine,
    id: i64,
    key: String,
    url: String,
    name: String,
    path: PathBuf,
    source: Option<String>,
    extras: Option<String>,
    size: u64,
    create_time: i64,
    listener: Option<Arc<dyn DownloadObserver>>,
}

impl DownloadTask {
    pub(crate) fn from_info(
        engine: Engine,
        info: &DownloadInfo,
        listener: Option<Arc<dyn DownloadObserver>>,
    ) -> Self {
        let mut task = Self {
            engine,
            id: info.id,
            key: info.key.clone(),
            url: info.url.clone(),
            name: info.name.clone(),
            path: info.path.clone(),
            source: info.source.clone(),
            extras: info.extras.clone(),
            size: info.content_length,
            create_time: info.create_time,
            listener,
        };
        if task.listener.is_some() {
            task.prepare();
        }
        task
    }

    fn prepare(&mut self) {
        if let Some((size, create_time)) = self.engine.prepare(&self.key, self.listener.clone()) {
            self.size = size;
            self.create_time = create_time;
        }
    }

    /// Record for a key the engine has never seen.
    pub(crate) fn to_info(&self) -> DownloadInfo {
        let mut info = DownloadInfo::new(
            self.id,
            self.url.clone(),
            self.name.clone(),
            self.path.clone(),
            self.source.clone(),
            self.extras.clone(),
        );
        info.create_time = self.create_time;
        info
    }

    /// Queue the download. A finished key is left alone until deleted.
    pub fn start(&self) {
        self.engine.enqueue(self);
    }

    pub fn pause(&self) {
        self.engine.pause(&self.key);
    }

    pub fn resume(&self) {
        self.engine.resume(&self.key);
    }

    /// Stop any transfer, forget the record and remove the file.
    pub fn delete(&mut self) {
        self.engine.delete(&self.key);
        self.listener = None;
    }

    /// Replace the observer. The new one is sent the current state; passing
    /// the observer already attached does nothing.
    pub fn set_listener(&mut self, listener: Option<Arc<dyn DownloadObserver>>) {
        if let (Some(old), Some(new)) = (&self.listener, &listener) {
            if same_ref(old, new) {
                return;
            }
        }
        self.detach();
        self.listener = listener;
        self.attach();
    }

    /// Detach the observer without touching the download.
    pub fn clear(&mut self) {
        self.detach();
        self.listener = None;
    }

    /// Re-register the current observer.
    pub fn attach(&self) {
        if let Some(listener) = &self.listener {
            self.engine.add_listener(&self.key, Arc::clone(listener));
        }
    }

    pub fn detach(&self) {
        if let Some(listener) = &self.listener {
            self.engine.remove_listener(&self.key, Arc::clone(listener));
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn extras(&self) -> Option<&str> {
        self.extras.as_deref()
    }

    /// Size known when the handle was prepared; 0 if unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn create_time(&self) -> i64 {
        self.create_time
    }

    pub fn listener(&self) -> Option<&Arc<dyn DownloadObserver>> {
        self.listener.as_ref()
    }

    /// Live state from the engine; `Prepared` for a key it has never seen.
    pub fn state(&self) -> DownloadState {
        self.engine.state(&self.key).unwrap_or_default()
    }

    pub fn info(&self) -> Option<DownloadInfo> {
        self.engine.info(&self.key)
    }

    /// Order by creation time, oldest first.
    pub fn compare_create_time(&self, other: &Self) -> Ordering {
        self.create_time.cmp(&other.create_time)
    }
}

impl PartialEq for DownloadTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DownloadTask {}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("key", &self.key)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("create_time", &self.create_time)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
