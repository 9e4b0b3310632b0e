//! Download jobs: identity, configuration and lifecycle states.
//!
//! A job turns one plan source into files on disk. It runs start to finish on a single
//! blocking task (see `registry`), reports everything through `JobEvent`s and keeps its
//! state private.

mod events;
mod run;
mod source;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::retry::RetryPolicy;

pub use events::{Emitter, JobEvent, PartOutcome, PartRef, Severity};
pub use run::{DownloadJob, JobContext};
pub use source::{PlanError, PlanSource, UrlList, UrlListFile};

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether each part waits for an explicit go-ahead before it is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Auto,
    Manual,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "manual" => Ok(Strategy::Manual),
            other => Err(format!("unknown strategy: {other} (expected auto or manual)")),
        }
    }
}

/// Lifecycle of a job. `Completed`, `Cancelled` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    ResolvingPlan,
    AwaitingConfirmation,
    ResolvingLink,
    Transferring { part_index: u32, total_parts: u32 },
    Completed,
    Cancelled,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "Preparing..."),
            JobState::ResolvingPlan => write!(f, "Fetching page..."),
            JobState::AwaitingConfirmation => write!(f, "Waiting for confirmation..."),
            JobState::ResolvingLink => write!(f, "Processing links..."),
            JobState::Transferring {
                part_index,
                total_parts,
            } => write!(f, "Downloading... {part_index}/{total_parts}"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Cancelled => write!(f, "Cancelled"),
            JobState::Error => write!(f, "Error"),
        }
    }
}

/// Everything needed to start a job.
pub struct JobSpec {
    pub source: Box<dyn PlanSource>,
    /// Human-readable name for logs and the CLI.
    pub label: String,
    /// Explicit host order; `None` tries every host in sorted order.
    pub host_order: Option<Vec<String>>,
    pub strategy: Strategy,
    pub retry: RetryPolicy,
    pub downloads_dir: PathBuf,
    pub archive_extension: String,
    pub part_pause: Duration,
    pub confirm_timeout: Duration,
}

impl JobSpec {
    /// Fails when the config holds values no job can run with (see `EngineConfig::validate`).
    pub fn from_config(source: Box<dyn PlanSource>, cfg: &EngineConfig) -> anyhow::Result<Self> {
        let label = source.describe();
        Ok(Self {
            source,
            label,
            host_order: cfg.host_order.clone(),
            strategy: cfg.strategy,
            retry: cfg.retry.policy()?,
            downloads_dir: cfg.downloads_dir.clone(),
            archive_extension: cfg.archive_extension.clone(),
            part_pause: cfg.part_pause(),
            confirm_timeout: cfg.confirm_timeout(),
        })
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("label", &self.label)
            .field("host_order", &self.host_order)
            .field("strategy", &self.strategy)
            .field("retry", &self.retry)
            .field("downloads_dir", &self.downloads_dir)
            .field("archive_extension", &self.archive_extension)
            .finish_non_exhaustive()
    }
}
