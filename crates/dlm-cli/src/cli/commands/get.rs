//! `dlm get <id> <url>` – download one URL and wait for it.

use anyhow::{bail, Result};
use dlm_core::naming::name_from_url;
use dlm_core::{DownloadState, Engine};
use std::collections::HashSet;
use std::sync::Arc;

use super::wait::Waiter;

#[derive(Debug)]
pub struct GetArgs {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub source: Option<String>,
    pub extras: Option<String>,
}

pub fn run_get(engine: &Engine, args: GetArgs) -> Result<()> {
    let name = args.name.unwrap_or_else(|| name_from_url(&args.url));
    let (waiter, rx) = Waiter::new();
    let mut builder = engine
        .new_task(args.id, args.url, name)
        .listener(Arc::new(waiter));
    if let Some(source) = args.source {
        builder = builder.source(source);
    }
    if let Some(extras) = args.extras {
        builder = builder.extras(extras);
    }
    let task = builder.create()?;

    if engine.state(task.key()) == Some(DownloadState::Finished) {
        println!(
            "{} already downloaded to {} (remove it first to fetch again)",
            task.key(),
            task.path().display()
        );
        return Ok(());
    }

    println!("Downloading {} -> {}", task.url(), task.path().display());
    task.start();
    let keys: HashSet<String> = [task.key().to_string()].into_iter().collect();
    let done = Waiter::wait(&rx, &keys);
    match done.get(task.key()) {
        Some(DownloadState::Finished) => {
            println!("Finished {}", task.path().display());
            Ok(())
        }
        Some(state) => bail!("download {} ended {}", task.key(), state),
        None => bail!("download {} did not complete", task.key()),
    }
}
