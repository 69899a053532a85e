//! Positional writer for a destination file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for one destination file; each `write_at` is independent of any cursor.
pub struct StorageWriter {
    file: File,
    path: PathBuf,
}

impl StorageWriter {
    /// Open `path` read/write, creating it (and its parent directories) if missing.
    /// Existing content is kept.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open destination: {}", path.display()))?;
        Ok(StorageWriter {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Write all of `data` at `offset`.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: seek + write through a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Cut the file to `len` bytes (used when a range request is answered with the full body).
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .with_context(|| format!("failed to truncate {}", self.path.display()))
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata().context("storage metadata")?.len())
    }

    /// Sync file data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
