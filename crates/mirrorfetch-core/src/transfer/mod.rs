//! Resumable single-file HTTP transfer.
//!
//! One `fetch` downloads one part to its destination path. A partial file left by a
//! failed attempt is continued with `Range: bytes=<size>-`; servers that ignore the
//! range get a fresh write from 0, and a 416 on a non-empty file means the part is
//! already complete. Each attempt is blocking; call from `spawn_blocking`.

mod response;
mod sink;

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::control::CancelToken;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use response::{classify, BodyMode, Reply, ResponseHead};
use sink::{existing_len, PartSink};

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Size of the destination file afterwards.
    pub file_size: u64,
    /// Body bytes written by this call, summed over all attempts.
    pub bytes_written: u64,
    /// Size of the destination before the first attempt.
    pub resumed_from: u64,
    /// The server answered 416 to the resume request: nothing left to fetch.
    pub already_complete: bool,
}

/// Receives transfer progress. Called on the transferring thread.
pub trait TransferObserver {
    fn on_progress(&self, bytes_downloaded: u64, total_bytes: u64);

    fn on_resume(&self, _offset: u64) {}

    /// The server ignored the range request; `discarded` bytes are rewritten.
    fn on_restart(&self, _discarded: u64) {}

    fn on_retry(&self, _retry: u32, _max_retries: u32, _error: &TransferError, _delay: Duration) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_progress(&self, _bytes_downloaded: u64, _total_bytes: u64) {}
}

/// Downloads one URL to one file.
pub trait Transfer: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        retry: &RetryPolicy,
        cancel: &CancelToken,
        observer: &dyn TransferObserver,
    ) -> Result<TransferOutcome, TransferError>;
}

/// libcurl-backed transfer.
#[derive(Debug, Clone)]
pub struct CurlTransfer {
    connect_timeout: Duration,
    stall_timeout: Duration,
}

impl Default for CurlTransfer {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

struct AttemptResult {
    file_size: u64,
    already_complete: bool,
}

impl CurlTransfer {
    pub fn new(connect_timeout: Duration, stall_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            stall_timeout,
        }
    }

    pub fn from_config(http: &HttpConfig) -> Self {
        Self::new(http.connect_timeout(), http.stall_timeout())
    }

    fn attempt(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelToken,
        observer: &dyn TransferObserver,
        written: &Cell<u64>,
    ) -> Result<AttemptResult, TransferError> {
        let offset = existing_len(dest).map_err(TransferError::Storage)?;
        let head = RefCell::new(ResponseHead::default());
        let mut sink = PartSink::new(dest, offset, written);
        let mut storage_error: Option<std::io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        // Abort when nothing at all arrives for the stall window.
        easy.low_speed_limit(1)?;
        easy.low_speed_time(self.stall_timeout)?;
        easy.progress(true)?;
        if offset > 0 {
            let mut list = curl::easy::List::new();
            list.append(&format!("Range: bytes={}-", offset))?;
            easy.http_headers(list)?;
        }

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                head.borrow_mut().feed(line);
                true
            })?;
            transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
            transfer.write_function(|data| {
                if cancel.is_cancelled() {
                    return Ok(0);
                }
                let head = head.borrow();
                let mode = match classify(head.status, offset) {
                    Reply::Write(mode) => mode,
                    // Error pages and 416 bodies are drained, never stored.
                    _ => return Ok(data.len()),
                };
                if !sink.is_open() {
                    match mode {
                        BodyMode::Append => observer.on_resume(offset),
                        BodyMode::Restart => {
                            tracing::warn!(
                                url,
                                offset,
                                "server ignored range request, restarting from 0"
                            );
                            observer.on_restart(offset);
                        }
                        BodyMode::Fresh => {}
                    }
                }
                if let Err(e) = sink.write(mode, data) {
                    storage_error = Some(e);
                    return Ok(0);
                }
                let total = head.total_bytes(mode, offset);
                if total > 0 {
                    observer.on_progress(sink.downloaded(), total);
                }
                Ok(data.len())
            })?;
            transfer.perform()
        };

        if let Err(e) = performed {
            if let Some(io) = storage_error {
                return Err(TransferError::Storage(io));
            }
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            return Err(TransferError::Curl(e));
        }

        let code = easy.response_code()?;
        let head = head.into_inner();
        match classify(code, offset) {
            Reply::AlreadyComplete => Ok(AttemptResult {
                file_size: offset,
                already_complete: true,
            }),
            Reply::Reject(code) => Err(TransferError::Http(code)),
            Reply::Write(mode) => {
                let received = sink.written();
                if let Some(expected) = head.content_length {
                    if received != expected {
                        return Err(TransferError::PartialTransfer { expected, received });
                    }
                }
                let file_size = sink.finish(mode).map_err(TransferError::Storage)?;
                Ok(AttemptResult {
                    file_size,
                    already_complete: false,
                })
            }
        }
    }
}

impl Transfer for CurlTransfer {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        retry: &RetryPolicy,
        cancel: &CancelToken,
        observer: &dyn TransferObserver,
    ) -> Result<TransferOutcome, TransferError> {
        let resumed_from = existing_len(dest).map_err(TransferError::Storage)?;
        let written = Cell::new(0u64);
        let result = run_with_retry(
            retry,
            cancel,
            |n, err, delay| {
                tracing::warn!(
                    url,
                    retry = n,
                    max_retries = retry.max_retries,
                    "transfer failed, retrying in {:?}: {}",
                    delay,
                    err
                );
                observer.on_retry(n, retry.max_retries, err, delay);
            },
            |_| self.attempt(url, dest, cancel, observer, &written),
        )?;
        Ok(TransferOutcome {
            file_size: result.file_size,
            bytes_written: written.get(),
            resumed_from,
            already_complete: result.already_complete,
        })
    }
}
