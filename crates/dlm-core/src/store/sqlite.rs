//! SQLite-backed record store (sqlx).
//!
//! The store contract is synchronous; an owned current-thread runtime drives
//! the async pool. Do not call into it from inside another tokio runtime.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::future::Future;
use std::path::{Path, PathBuf};

use super::DownloadStore;
use crate::record::{DownloadInfo, DownloadState};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite download database.
///
/// The default file lives under the XDG state directory:
/// `~/.local/state/dlm/downloads.db`.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    rt: tokio::runtime::Runtime,
}

impl SqliteStore {
    /// Open (or create) the default database and run migrations.
    pub fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("dlm")?;
        let db_path = xdg_dirs
            .place_state_file("downloads.db")
            .context("create state directory")?;
        Self::open_at(db_path)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        Self::connect(&(path_to_sqlite_uri(path) + "?mode=rwc"), 4)
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        // Single connection so the pool never hands back a different empty DB.
        Self::connect("sqlite::memory:", 1)
    }

    fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build store runtime")?;
        let pool = rt
            .block_on(
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(uri),
            )
            .with_context(|| format!("open {}", uri))?;
        let store = SqliteStore { pool, rt };
        store.block_on(store.migrate())?;
        Ok(store)
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                key TEXT PRIMARY KEY NOT NULL,
                id INTEGER NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                source TEXT,
                extras TEXT,
                content_length INTEGER NOT NULL DEFAULT 0,
                finished_length INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                create_time INTEGER NOT NULL,
                finish_time INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_info(row: &SqliteRow) -> DownloadInfo {
    let path: String = row.get("path");
    let state: String = row.get("state");
    let content_length: i64 = row.get("content_length");
    let finished_length: i64 = row.get("finished_length");
    DownloadInfo {
        id: row.get("id"),
        key: row.get("key"),
        url: row.get("url"),
        name: row.get("name"),
        path: PathBuf::from(path),
        source: row.get("source"),
        extras: row.get("extras"),
        content_length: content_length.max(0) as u64,
        finished_length: finished_length.max(0) as u64,
        state: DownloadState::from_str(&state),
        create_time: row.get("create_time"),
        finish_time: row.get("finish_time"),
    }
}

impl DownloadStore for SqliteStore {
    fn exists(&self, info: &DownloadInfo) -> Result<bool> {
        self.block_on(async {
            let row = sqlx::query("SELECT 1 FROM downloads WHERE key = ?1")
                .bind(&info.key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.is_some())
        })
    }

    fn insert(&self, info: &DownloadInfo) -> Result<()> {
        self.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO downloads (
                    key, id, url, name, path, source, extras,
                    content_length, finished_length, state, create_time, finish_time
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(&info.key)
            .bind(info.id)
            .bind(&info.url)
            .bind(&info.name)
            .bind(info.path.to_string_lossy().to_string())
            .bind(&info.source)
            .bind(&info.extras)
            .bind(info.content_length as i64)
            .bind(info.finished_length as i64)
            .bind(info.state.as_str())
            .bind(info.create_time)
            .bind(info.finish_time)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert {}", info.key))?;
            Ok(())
        })
    }

    fn update(&self, info: &DownloadInfo) -> Result<()> {
        self.block_on(async {
            sqlx::query(
                r#"
                UPDATE downloads
                SET url = ?1,
                    content_length = ?2,
                    finished_length = ?3,
                    state = ?4,
                    finish_time = ?5
                WHERE key = ?6
                "#,
            )
            .bind(&info.url)
            .bind(info.content_length as i64)
            .bind(info.finished_length as i64)
            .bind(info.state.as_str())
            .bind(info.finish_time)
            .bind(&info.key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update {}", info.key))?;
            Ok(())
        })
    }

    fn delete(&self, info: &DownloadInfo) -> Result<()> {
        self.block_on(async {
            sqlx::query("DELETE FROM downloads WHERE key = ?1")
                .bind(&info.key)
                .execute(&self.pool)
                .await
                .with_context(|| format!("delete {}", info.key))?;
            Ok(())
        })
    }

    fn query(&self) -> Result<Vec<DownloadInfo>> {
        self.block_on(async {
            let rows = sqlx::query(
                r#"
                SELECT key, id, url, name, path, source, extras,
                       content_length, finished_length, state, create_time, finish_time
                FROM downloads
                ORDER BY create_time ASC, key ASC
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.iter().map(row_to_info).collect())
        })
    }
}
