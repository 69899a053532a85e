//! `dlm remove <key>` – delete a download's record and file.

use anyhow::{bail, Result};
use dlm_core::Engine;

pub fn run_remove(engine: &Engine, key: &str) -> Result<()> {
    let Some(info) = engine.info(key) else {
        bail!("no download with key {}", key);
    };
    engine.delete_info(&info);
    println!("Removed {} ({})", info.key, info.path.display());
    Ok(())
}
