//! Job registry: starts jobs and routes cancel/confirm requests to them.
//!
//! Each started job is registered with its cancel token and confirmation handle; the
//! job itself runs on a Tokio blocking task and reports through the shared event
//! channel. When a job reaches a terminal state it is unregistered and a `Finished`
//! event is sent, in that order, so a receiver that sees `Finished` also sees
//! `is_running(id) == false`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::control::{CancelToken, ConfirmGate, ConfirmHandle};
use crate::job::{DownloadJob, Emitter, JobContext, JobEvent, JobId, JobSpec, JobState};
use crate::resolver::Resolver;
use crate::transfer::Transfer;

struct JobHandle {
    cancel: CancelToken,
    confirm: ConfirmHandle,
}

type JobMap = Arc<RwLock<HashMap<JobId, JobHandle>>>;

/// Shared registry of running jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: JobMap,
    next_id: Arc<AtomicU64>,
    events: UnboundedSender<JobEvent>,
    resolver: Arc<dyn Resolver>,
    transfer: Arc<dyn Transfer>,
}

impl JobRegistry {
    /// Creates the registry and the single receiver for every job's events.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transfer: Arc<dyn Transfer>,
    ) -> (Self, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            events: tx,
            resolver,
            transfer,
        };
        (registry, rx)
    }

    /// Starts a job on a blocking task and returns its id immediately.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, spec: JobSpec) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancelToken::new();
        let (confirm, gate) = ConfirmGate::pair();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                JobHandle {
                    cancel: cancel.clone(),
                    confirm,
                },
            );

        let ctx = JobContext {
            events: Emitter::new(id, self.events.clone()),
            cancel,
            gate,
            resolver: Arc::clone(&self.resolver),
            transfer: Arc::clone(&self.transfer),
        };
        let jobs = Arc::clone(&self.jobs);
        let events = self.events.clone();
        tracing::info!(job_id = id.0, label = %spec.label, "starting job");
        tokio::task::spawn_blocking(move || {
            let job = DownloadJob::new(spec, ctx);
            // A panicking job still has to be unregistered and reported.
            let state = match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                Ok(state) => state,
                Err(_) => {
                    tracing::error!(job_id = id.0, "job panicked");
                    JobState::Error
                }
            };
            jobs.write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            tracing::info!(job_id = id.0, %state, "job finished");
            let _ = events.send(JobEvent::Finished { job_id: id, state });
        });
        id
    }

    /// Requests cancellation. Returns `false` when no such job is running.
    /// Cancelling twice is harmless.
    pub fn cancel(&self, id: JobId) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            Some(handle) => {
                handle.cancel.cancel();
                tracing::debug!(job_id = id.0, "cancel requested");
                true
            }
            None => false,
        }
    }

    /// Releases a manual-strategy job waiting for confirmation.
    /// Returns `false` when no such job is running.
    pub fn confirm(&self, id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|handle| handle.confirm.confirm())
            .unwrap_or(false)
    }

    /// Requests cancellation of every running job.
    pub fn cancel_all(&self) {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        for handle in jobs.values() {
            handle.cancel.cancel();
        }
        if !jobs.is_empty() {
            tracing::info!(count = jobs.len(), "cancelling all jobs");
        }
    }

    pub fn is_running(&self, id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Ids of running jobs, ascending.
    pub fn running(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}
