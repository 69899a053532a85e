//! Tracing setup: a log file under the XDG state dir, or stderr when that fails.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,dlm=debug,dlm_core=debug";

/// Where log lines ended up after [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    File(PathBuf),
    Stderr,
}

/// Shared append handle; each event gets its own `&File` writer.
struct SharedFile(Arc<fs::File>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file: `~/.local/state/dlm/dlm.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlm")?;
    Ok(xdg_dirs.get_state_home().join("dlm").join("dlm.log"))
}

fn open_log_file() -> Result<(fs::File, PathBuf)> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    Ok((file, path))
}

/// Install the global subscriber. Prefers the state-dir log file; if it cannot be
/// opened, logs to stderr instead. Returns the sink in use.
///
/// Calling this twice in one process is a no-op for the second call.
pub fn init() -> LogSink {
    match open_log_file() {
        Ok((file, path)) => {
            let file = Arc::new(file);
            let writer = BoxMakeWriter::new(move || SharedFile(Arc::clone(&file)));
            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .is_ok();
            if installed {
                tracing::info!("dlm logging initialized at {}", path.display());
            }
            LogSink::File(path)
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(io::stderr)
                .with_ansi(false)
                .try_init();
            tracing::warn!("log file unavailable ({:#}), logging to stderr", e);
            LogSink::Stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn log_path_is_under_dlm() {
        if let Ok(path) = log_path() {
            assert!(path.ends_with("dlm/dlm.log"));
        }
    }
}
