//! Failure classification for one transfer run.

use thiserror::Error;

/// Why a run ended in `Failed`. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Curl reported an error (bad URL, connect failure, stalled read, ...).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// Response status other than 200/206.
    #[error("HTTP {0}")]
    Http(u32),
    /// The total length could not be resolved to a positive value.
    #[error("server did not report a usable content length")]
    NoContentLength,
    /// Opening or writing the destination failed.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    /// The stream ended before `expected` bytes were stored.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    Partial { expected: u64, received: u64 },
    /// A partial response started somewhere other than the requested offset.
    #[error("asked for bytes from {requested}, server sent from {got}")]
    RangeMismatch { requested: u64, got: u64 },
    /// The server sent more bytes than the resolved length.
    #[error("server sent more than {expected} bytes")]
    Overflow { expected: u64 },
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<std::io::Error>() {
            Ok(io) => TransferError::Storage(io),
            Err(e) => TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{:#}", e),
            )),
        }
    }
}
