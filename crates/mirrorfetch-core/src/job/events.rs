//! Events a job emits, and the emitter that timestamps them and mirrors logs to tracing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

use super::{JobId, JobState};
use crate::planner::PartDescriptor;

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Download,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Download => "DOWNLOAD",
        };
        f.write_str(s)
    }
}

/// Identifies one part in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRef {
    pub file_base: String,
    pub part_number: u32,
    pub target_filename: String,
}

impl From<&PartDescriptor> for PartRef {
    fn from(d: &PartDescriptor) -> Self {
        Self {
            file_base: d.file_base.clone(),
            part_number: d.part_number,
            target_filename: d.target_filename.clone(),
        }
    }
}

/// How one part ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartOutcome {
    Downloaded { host: String, bytes: u64 },
    /// Target already on disk; nothing fetched.
    Skipped { existing_bytes: u64 },
    /// Part number absent from the plan.
    Missing,
    /// No host produced the part.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        label: String,
    },
    Status {
        job_id: JobId,
        state: JobState,
    },
    AwaitingConfirmation {
        job_id: JobId,
        part: PartRef,
    },
    Progress {
        job_id: JobId,
        bytes_downloaded: u64,
        total_bytes: u64,
        part_index: u32,
        total_parts: u32,
    },
    PartFinished {
        job_id: JobId,
        part: PartRef,
        outcome: PartOutcome,
    },
    Log {
        job_id: JobId,
        at: DateTime<Utc>,
        level: Severity,
        message: String,
    },
    Finished {
        job_id: JobId,
        state: JobState,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Status { job_id, .. }
            | JobEvent::AwaitingConfirmation { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::PartFinished { job_id, .. }
            | JobEvent::Log { job_id, .. }
            | JobEvent::Finished { job_id, .. } => *job_id,
        }
    }
}

/// Per-job event sender. A closed receiver is not an error: the job keeps running and
/// its log lines still reach tracing.
#[derive(Debug, Clone)]
pub struct Emitter {
    job_id: JobId,
    tx: UnboundedSender<JobEvent>,
}

impl Emitter {
    pub fn new(job_id: JobId, tx: UnboundedSender<JobEvent>) -> Self {
        Self { job_id, tx }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn send(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, state: JobState) {
        self.send(JobEvent::Status {
            job_id: self.job_id,
            state,
        });
    }

    pub fn log(&self, level: Severity, message: impl Into<String>) {
        let message = message.into();
        let job_id = self.job_id.0;
        match level {
            Severity::Debug => tracing::debug!(job_id, "{}", message),
            Severity::Info | Severity::Success | Severity::Download => {
                tracing::info!(job_id, %level, "{}", message)
            }
            Severity::Warning => tracing::warn!(job_id, "{}", message),
            Severity::Error => tracing::error!(job_id, "{}", message),
        }
        self.send(JobEvent::Log {
            job_id: self.job_id,
            at: Utc::now(),
            level,
            message,
        });
    }
}
