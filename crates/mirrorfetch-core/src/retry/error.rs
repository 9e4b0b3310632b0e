//! Transfer error type used for retry decisions.

use thiserror::Error;

/// Error returned by one transfer attempt (curl failure, HTTP error, short body, disk).
/// Kept typed so the retry loop can decide before anything is flattened into `anyhow`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection reset, DNS, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Body ended before the announced length (server closed early).
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The job was cancelled; the partial file stays on disk.
    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransferError::Storage(_) | TransferError::Cancelled)
    }
}
