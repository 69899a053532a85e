//! Single-stream HTTP GET with an optional byte range.
//!
//! Runs on the calling thread (a transfer-pool worker). Every body chunk curl
//! hands back is a chunk boundary: the sink is asked whether to keep going
//! before the chunk is written, so a stop request takes effect within one
//! chunk and never interrupts a read in progress.

mod error;
mod response;

use std::cell::RefCell;
use std::str;
use std::time::Duration;

use crate::config::EngineConfig;

pub use error::TransferError;
pub use response::{ResponseHead, Resolved};
pub(crate) use response::resolve;

/// Network knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    /// Fail if no byte arrives for this long.
    pub read_timeout: Duration,
}

impl TransferSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size.max(1024),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            read_timeout: Duration::from_secs(cfg.read_timeout_secs.max(1)),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// How a run ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The body was consumed to the end.
    Completed,
    /// The sink asked to stop at a chunk boundary.
    Stopped,
}

/// Receiver of one response body.
pub trait ChunkSink {
    /// Called once, before the first body byte (or at the end for an empty body).
    /// An error fails the run.
    fn on_response(&mut self, head: &ResponseHead) -> Result<(), TransferError>;

    /// Checked before every chunk; `false` stops without writing that chunk.
    fn keep_going(&self) -> bool;

    fn on_chunk(&mut self, data: &[u8]) -> Result<(), TransferError>;
}

/// GET `url`, asking for `range` (inclusive byte bounds) when given, and feed
/// the body to `sink`. The connection is released on every return path.
pub fn fetch(
    url: &str,
    range: Option<(u64, u64)>,
    settings: &TransferSettings,
    sink: &mut dyn ChunkSink,
) -> Result<Outcome, TransferError> {
    let headers: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let mut started = false;
    let mut stopped = false;
    let mut failure: Option<TransferError> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.low_speed_limit(1)?;
    easy.low_speed_time(settings.read_timeout)?;
    easy.buffer_size(settings.chunk_size)?;
    if let Some((start, end)) = range {
        easy.range(&format!("{}-{}", start, end))?;
    }

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            if !sink.keep_going() {
                stopped = true;
                return Ok(0);
            }
            if !started {
                started = true;
                let head = response::parse_head(&headers.borrow());
                if let Err(e) = sink.on_response(&head) {
                    failure = Some(e);
                    return Ok(0);
                }
            }
            match sink.on_chunk(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    failure = Some(e);
                    Ok(0)
                }
            }
        })?;
        transfer.perform()
    };

    if let Some(e) = failure {
        return Err(e);
    }
    if stopped {
        return Ok(Outcome::Stopped);
    }
    performed?;
    if !started {
        let head = response::parse_head(&headers.borrow());
        sink.on_response(&head)?;
    }
    Ok(Outcome::Completed)
}
