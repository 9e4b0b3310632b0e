//! Integration tests: resumable transfer against a local mirror server.
//!
//! Covers Range resume, servers that ignore Range, 416 on an already complete file,
//! the retry bound, a connection dropped mid-body and cancellation mid-transfer.

mod common;

use std::sync::Mutex;
use std::time::Duration;

use common::mirror_server::{MirrorServer, Route};
use mirrorfetch_core::control::CancelToken;
use mirrorfetch_core::retry::{RetryPolicy, TransferError};
use mirrorfetch_core::transfer::{CurlTransfer, Transfer, TransferObserver};
use tempfile::tempdir;

fn body() -> Vec<u8> {
    (0u8..251).cycle().take(64 * 1024).collect()
}

fn transfer() -> CurlTransfer {
    CurlTransfer::new(Duration::from_secs(5), Duration::from_secs(10))
}

fn quick_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(50))
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<(u64, u64)>>,
    resumes: Mutex<Vec<u64>>,
    restarts: Mutex<Vec<u64>>,
    retries: Mutex<Vec<u32>>,
    cancel_on_progress: Option<CancelToken>,
}

impl TransferObserver for Recorder {
    fn on_progress(&self, bytes_downloaded: u64, total_bytes: u64) {
        self.progress
            .lock()
            .unwrap()
            .push((bytes_downloaded, total_bytes));
        if let Some(token) = &self.cancel_on_progress {
            token.cancel();
        }
    }

    fn on_resume(&self, offset: u64) {
        self.resumes.lock().unwrap().push(offset);
    }

    fn on_restart(&self, discarded: u64) {
        self.restarts.lock().unwrap().push(discarded);
    }

    fn on_retry(&self, retry: u32, _max: u32, _error: &TransferError, _delay: Duration) {
        self.retries.lock().unwrap().push(retry);
    }
}

#[test]
fn partial_file_is_resumed_with_range() {
    let body = body();
    let server = MirrorServer::start();
    server.route("/Album.part1.rar", Route::new(body.clone()));
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Album.part1.rar");
    std::fs::write(&dest, &body[..10_000]).unwrap();

    let recorder = Recorder::default();
    let outcome = transfer()
        .fetch(
            &server.url("/Album.part1.rar"),
            &dest,
            &RetryPolicy::none(),
            &CancelToken::new(),
            &recorder,
        )
        .expect("fetch");

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(outcome.resumed_from, 10_000);
    assert_eq!(outcome.bytes_written, body.len() as u64 - 10_000);
    assert_eq!(outcome.file_size, body.len() as u64);
    assert!(!outcome.already_complete);

    let gets = server.gets("/Album.part1.rar");
    assert_eq!(gets.len(), 1);
    assert_eq!(gets[0].range.as_deref(), Some("bytes=10000-"));
    assert_eq!(*recorder.resumes.lock().unwrap(), vec![10_000]);
    let progress = recorder.progress.lock().unwrap();
    assert_eq!(progress.last(), Some(&(body.len() as u64, body.len() as u64)));
    assert!(progress.iter().all(|(done, _)| *done > 10_000));
}

#[test]
fn fresh_download_sends_no_range() {
    let body = body();
    let server = MirrorServer::start();
    server.route("/Kit.part1.rar", Route::new(body.clone()));
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Kit.part1.rar");

    let outcome = transfer()
        .fetch(
            &server.url("/Kit.part1.rar"),
            &dest,
            &RetryPolicy::none(),
            &CancelToken::new(),
            &Recorder::default(),
        )
        .expect("fetch");

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(outcome.resumed_from, 0);
    assert_eq!(outcome.bytes_written, body.len() as u64);
    assert_eq!(server.gets("/Kit.part1.rar")[0].range, None);
}

#[test]
fn server_ignoring_range_restarts_from_zero() {
    let body = body();
    let server = MirrorServer::start();
    server.route(
        "/Album.part1.rar",
        Route {
            support_ranges: false,
            ..Route::new(body.clone())
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Album.part1.rar");
    std::fs::write(&dest, vec![0xAA; 500]).unwrap();

    let recorder = Recorder::default();
    let outcome = transfer()
        .fetch(
            &server.url("/Album.part1.rar"),
            &dest,
            &RetryPolicy::none(),
            &CancelToken::new(),
            &recorder,
        )
        .expect("fetch");

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(outcome.bytes_written, body.len() as u64);
    assert_eq!(*recorder.restarts.lock().unwrap(), vec![500]);
    assert_eq!(
        server.gets("/Album.part1.rar")[0].range.as_deref(),
        Some("bytes=500-")
    );
}

#[test]
fn range_not_satisfiable_means_complete() {
    let body = body();
    let server = MirrorServer::start();
    server.route("/Album.part2.rar", Route::new(body.clone()));
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Album.part2.rar");
    std::fs::write(&dest, &body).unwrap();

    let outcome = transfer()
        .fetch(
            &server.url("/Album.part2.rar"),
            &dest,
            &quick_retries(3),
            &CancelToken::new(),
            &Recorder::default(),
        )
        .expect("fetch");

    assert!(outcome.already_complete);
    assert_eq!(outcome.bytes_written, 0);
    assert_eq!(outcome.file_size, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.gets("/Album.part2.rar").len(), 1);
}

#[test]
fn failing_server_is_tried_max_retries_plus_one_times() {
    let server = MirrorServer::start();
    server.route(
        "/Broken.part1.rar",
        Route {
            fail_first: 100,
            ..Route::new(body())
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Broken.part1.rar");

    let recorder = Recorder::default();
    let err = transfer()
        .fetch(
            &server.url("/Broken.part1.rar"),
            &dest,
            &quick_retries(2),
            &CancelToken::new(),
            &recorder,
        )
        .unwrap_err();

    assert!(matches!(err, TransferError::Http(500)), "got {err:?}");
    assert_eq!(server.gets("/Broken.part1.rar").len(), 3);
    assert_eq!(*recorder.retries.lock().unwrap(), vec![1, 2]);
    assert!(!dest.exists(), "error bodies must not be written");
}

#[test]
fn transient_failures_then_success() {
    let body = body();
    let server = MirrorServer::start();
    server.route(
        "/Flaky.part1.rar",
        Route {
            fail_first: 2,
            ..Route::new(body.clone())
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Flaky.part1.rar");

    transfer()
        .fetch(
            &server.url("/Flaky.part1.rar"),
            &dest,
            &quick_retries(3),
            &CancelToken::new(),
            &Recorder::default(),
        )
        .expect("fetch");

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.gets("/Flaky.part1.rar").len(), 3);
}

#[test]
fn dropped_connection_is_retried_and_resumed() {
    let body = body();
    let server = MirrorServer::start();
    server.route(
        "/Album.part1.rar",
        Route {
            drop_after: Some(20_000),
            ..Route::new(body.clone())
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Album.part1.rar");

    let outcome = transfer()
        .fetch(
            &server.url("/Album.part1.rar"),
            &dest,
            &quick_retries(3),
            &CancelToken::new(),
            &Recorder::default(),
        )
        .expect("fetch");

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(outcome.bytes_written, body.len() as u64);
    let gets = server.gets("/Album.part1.rar");
    assert_eq!(gets.len(), 2);
    assert_eq!(gets[0].range, None);
    assert_eq!(gets[1].range.as_deref(), Some("bytes=20000-"));
}

#[test]
fn cancel_mid_transfer_keeps_partial_file() {
    let server = MirrorServer::start();
    server.route(
        "/Slow.part1.rar",
        Route {
            stall_after: Some(4096),
            ..Route::new(body())
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Slow.part1.rar");
    let cancel = CancelToken::new();
    let recorder = Recorder {
        cancel_on_progress: Some(cancel.clone()),
        ..Recorder::default()
    };

    let started = std::time::Instant::now();
    let err = transfer()
        .fetch(
            &server.url("/Slow.part1.rar"),
            &dest,
            &quick_retries(3),
            &cancel,
            &recorder,
        )
        .unwrap_err();

    assert!(matches!(err, TransferError::Cancelled), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(8));
    let len = std::fs::metadata(&dest).unwrap().len();
    assert!(len > 0 && len <= 4096, "partial file has {len} bytes");
    assert_eq!(server.gets("/Slow.part1.rar").len(), 1);
}

#[test]
fn missing_file_is_an_http_error() {
    let server = MirrorServer::start();
    let dir = tempdir().unwrap();
    let dest = dir.path().join("Gone.part1.rar");

    let err = transfer()
        .fetch(
            &server.url("/Gone.part1.rar"),
            &dest,
            &RetryPolicy::none(),
            &CancelToken::new(),
            &Recorder::default(),
        )
        .unwrap_err();

    assert!(matches!(err, TransferError::Http(404)), "got {err:?}");
    assert!(!dest.exists());
}
