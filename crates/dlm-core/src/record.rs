//! Durable description of one download and its lifecycle state.
//!
//! `DownloadInfo` is the snapshot that is persisted and handed to observers;
//! the engine keeps one mutable copy per live job and writes a snapshot back
//! at every durable checkpoint.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle state of a download.
///
/// `Prepared` covers both "no record yet" and "record exists but has never been
/// started"; there is no separate unknown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    #[default]
    Prepared,
    Waiting,
    Running,
    Paused,
    Failed,
    Finished,
}

impl DownloadState {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadState::Prepared => "prepared",
            DownloadState::Waiting => "waiting",
            DownloadState::Running => "running",
            DownloadState::Paused => "paused",
            DownloadState::Failed => "failed",
            DownloadState::Finished => "finished",
        }
    }

    /// Unknown strings map to `Failed` so a corrupt row stays resumable.
    pub fn from_str(s: &str) -> Self {
        match s {
            "prepared" => DownloadState::Prepared,
            "waiting" => DownloadState::Waiting,
            "running" => DownloadState::Running,
            "paused" => DownloadState::Paused,
            "failed" => DownloadState::Failed,
            "finished" => DownloadState::Finished,
            _ => DownloadState::Failed,
        }
    }

    /// States that end a run and are written to the store before broadcast.
    pub fn is_durable(self) -> bool {
        matches!(
            self,
            DownloadState::Paused | DownloadState::Failed | DownloadState::Finished
        )
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download: identity, source URL, destination, byte counts and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Caller-assigned identifier.
    pub id: i64,
    /// Lookup key: `id` followed by the extension of `name` (see [`derive_key`]).
    pub key: String,
    pub url: String,
    /// Destination file name.
    pub name: String,
    /// Full destination path.
    pub path: PathBuf,
    pub source: Option<String>,
    /// Opaque passthrough for callers.
    pub extras: Option<String>,
    /// Total size in bytes; 0 until the server reports it.
    pub content_length: u64,
    pub finished_length: u64,
    pub state: DownloadState,
    /// Unix milliseconds.
    pub create_time: i64,
    /// Unix milliseconds, set when the transfer finishes.
    pub finish_time: Option<i64>,
}

impl DownloadInfo {
    /// New never-persisted record in the `Prepared` state.
    pub fn new(
        id: i64,
        url: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: Option<String>,
        extras: Option<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            key: derive_key(id, &name),
            url: url.into(),
            name,
            path: path.into(),
            source,
            extras,
            content_length: 0,
            finished_length: 0,
            state: DownloadState::Prepared,
            create_time: unix_millis(),
            finish_time: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == DownloadState::Finished
    }

    /// Fraction complete in [0.0, 1.0]; 0 while the length is unknown.
    pub fn fraction(&self) -> f64 {
        if self.content_length == 0 {
            return 0.0;
        }
        (self.finished_length as f64 / self.content_length as f64).min(1.0)
    }
}

/// Derives the lookup key for a download: the id followed by the extension of
/// `name`, dot included (`7` + `movie.mp4` → `7.mp4`). Names without a dot
/// produce the bare id.
pub fn derive_key(id: i64, name: &str) -> String {
    match name.rfind('.') {
        Some(index) => format!("{}{}", id, &name[index..]),
        None => id.to_string(),
    }
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
