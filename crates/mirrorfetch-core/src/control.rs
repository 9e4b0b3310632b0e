//! Cooperative job control: cancellation tokens and the manual confirmation gate.
//!
//! Each running job owns a `CancelToken` and a `ConfirmGate`; the registry keeps the
//! matching handles so `cancel(id)` / `confirm(id)` can reach the job without touching
//! any of its state. The download loop checks the token between chunks, hosts and parts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellable waits.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Time left before `deadline`, capped to one wait slice. `None` once the deadline has
/// passed; a missing deadline (too far out to represent) never expires.
fn next_slice(deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            (now < deadline).then(|| WAIT_SLICE.min(deadline - now))
        }
        None => Some(WAIT_SLICE),
    }
}

/// Shared cancellation flag. Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleeps for `duration` unless cancelled first.
    /// Returns `false` when the wait was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let Some(slice) = next_slice(deadline) else {
                return true;
            };
            std::thread::sleep(slice);
        }
    }
}

/// How a manual confirmation wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Confirmed,
    TimedOut,
    Cancelled,
}

/// Sending side of a job's confirmation gate, held by the registry.
#[derive(Debug, Clone)]
pub struct ConfirmHandle(Sender<()>);

impl ConfirmHandle {
    /// Signal the job that it may proceed. Returns `false` when the job is gone.
    pub fn confirm(&self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Receiving side of the confirmation gate, owned by the job.
#[derive(Debug)]
pub struct ConfirmGate(Receiver<()>);

impl ConfirmGate {
    pub fn pair() -> (ConfirmHandle, ConfirmGate) {
        let (tx, rx) = mpsc::channel();
        (ConfirmHandle(tx), ConfirmGate(rx))
    }

    /// Drops confirmations that arrived while the job was not waiting, so a stale
    /// signal cannot release a later part.
    pub fn drain(&self) {
        while self.0.try_recv().is_ok() {}
    }

    /// Blocks until confirmed, `timeout` elapses, or `cancel` is set.
    pub fn wait(&self, timeout: Duration, cancel: &CancelToken) -> GateOutcome {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if cancel.is_cancelled() {
                return GateOutcome::Cancelled;
            }
            let Some(slice) = next_slice(deadline) else {
                return GateOutcome::TimedOut;
            };
            match self.0.recv_timeout(slice) {
                Ok(()) => return GateOutcome::Confirmed,
                Err(RecvTimeoutError::Timeout) => continue,
                // Nobody can confirm any more; only the deadline or cancel can release us.
                Err(RecvTimeoutError::Disconnected) => {
                    let left = deadline
                        .map(|d| d.saturating_duration_since(Instant::now()))
                        .unwrap_or(Duration::MAX);
                    if !cancel.sleep(left) {
                        return GateOutcome::Cancelled;
                    }
                    return GateOutcome::TimedOut;
                }
            }
        }
    }
}

/// Default path for the control socket, in the XDG state dir next to the log file.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mirrorfetch")?.get_state_home();
    Ok(dir.join("control.sock"))
}
