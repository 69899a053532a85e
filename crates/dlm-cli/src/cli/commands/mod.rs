//! CLI command handlers, one file per command.

mod get;
mod remove;
mod resume;
mod status;
mod wait;

use anyhow::{Context, Result};
use dlm_core::{Engine, EngineConfig, SqliteStore};
use std::sync::Arc;

pub use get::{run_get, GetArgs};
pub use remove::run_remove;
pub use resume::run_resume;
pub use status::run_status;

/// Engine over the default on-disk store.
pub fn open_engine(cfg: EngineConfig) -> Result<Engine> {
    let store = SqliteStore::open_default().context("open download database")?;
    Engine::builder(cfg).store(Arc::new(store)).build()
}
