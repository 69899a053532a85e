//! CLI for the DLM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlm_core::config;

use commands::{open_engine, run_get, run_remove, run_resume, run_status, GetArgs};

/// Top-level CLI for the DLM download manager.
#[derive(Debug, Parser)]
#[command(name = "dlm")]
#[command(about = "DLM: resumable single-stream download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL, resuming a previous partial download of the same id.
    Get {
        /// Caller-assigned download id; with the name's extension it forms the key.
        id: i64,
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Destination file name (default: last URL path segment).
        #[arg(long)]
        name: Option<String>,
        /// Free-form origin label stored with the record.
        #[arg(long)]
        source: Option<String>,
        /// Opaque string stored with the record.
        #[arg(long)]
        extras: Option<String>,
    },

    /// Resume every unfinished download and wait for them.
    Resume,

    /// Show every known download.
    Status {
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a download's record and file by key.
    Remove {
        /// Download key, e.g. `7.iso`.
        key: String,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let engine = open_engine(cfg)?;

        let result = match cli.command {
            CliCommand::Get {
                id,
                url,
                name,
                source,
                extras,
            } => run_get(
                &engine,
                GetArgs {
                    id,
                    url,
                    name,
                    source,
                    extras,
                },
            ),
            CliCommand::Resume => run_resume(&engine),
            CliCommand::Status { json } => run_status(&engine, json),
            CliCommand::Remove { key } => run_remove(&engine, &key),
        };
        engine.shutdown();
        result
    }
}

#[cfg(test)]
mod tests;
