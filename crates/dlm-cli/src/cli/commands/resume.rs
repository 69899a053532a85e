//! `dlm resume` – resume every unfinished download and wait for them.

use anyhow::{bail, Result};
use dlm_core::{DownloadObserver, DownloadState, Engine};
use std::collections::HashSet;
use std::sync::Arc;

use super::wait::Waiter;

pub fn run_resume(engine: &Engine) -> Result<()> {
    let pending = engine.all_tasks();
    if pending.is_empty() {
        println!("No unfinished downloads.");
        return Ok(());
    }

    let (waiter, rx) = Waiter::new();
    let waiter: Arc<dyn DownloadObserver> = Arc::new(waiter);
    let mut keys = HashSet::new();
    let mut tasks = Vec::with_capacity(pending.len());
    for mut task in pending {
        task.set_listener(Some(Arc::clone(&waiter)));
        println!("Resuming {} ({})", task.key(), task.name());
        keys.insert(task.key().to_string());
        tasks.push(task);
    }
    for task in &tasks {
        task.start();
    }

    let done = Waiter::wait(&rx, &keys);
    let failed: Vec<&String> = done
        .iter()
        .filter(|(_, state)| **state != DownloadState::Finished)
        .map(|(key, _)| key)
        .collect();
    println!("{} of {} download(s) finished", keys.len() - failed.len(), keys.len());
    if !failed.is_empty() {
        bail!("not finished: {:?}", failed);
    }
    Ok(())
}
