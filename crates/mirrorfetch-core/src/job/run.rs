//! The per-job download loop.
//!
//! Resolve the plan, then walk file bases in plan order and parts 1..=max in order.
//! Each part is skipped when already on disk, reported missing when the plan has no
//! links for it, and otherwise tried host by host until one resolves and transfers.
//! Part failures are reported and the loop moves on; only plan problems are fatal.

use std::sync::Arc;
use std::time::Duration;

use super::events::{Emitter, JobEvent, PartOutcome, PartRef, Severity};
use super::{JobSpec, JobState, Strategy};
use crate::control::{CancelToken, ConfirmGate, GateOutcome};
use crate::host_policy::host_order;
use crate::planner::{HostLinks, PartDescriptor};
use crate::resolver::Resolver;
use crate::retry::TransferError;
use crate::transfer::{Transfer, TransferObserver};

/// Handles a job needs from the outside world.
pub struct JobContext {
    pub events: Emitter,
    pub cancel: CancelToken,
    pub gate: ConfirmGate,
    pub resolver: Arc<dyn Resolver>,
    pub transfer: Arc<dyn Transfer>,
}

/// Why `execute` stopped early.
enum Interrupt {
    Cancelled,
    Fatal(String),
}

pub struct DownloadJob {
    spec: JobSpec,
    ctx: JobContext,
    state: JobState,
    /// File base and part number being worked on; `None` before the first part.
    current: Option<(String, u32)>,
    part_index: u32,
    total_parts: u32,
}

impl DownloadJob {
    pub fn new(spec: JobSpec, ctx: JobContext) -> Self {
        Self {
            spec,
            ctx,
            state: JobState::Queued,
            current: None,
            part_index: 0,
            total_parts: 0,
        }
    }

    /// Runs the job to a terminal state and returns it. Blocking.
    pub fn run(mut self) -> JobState {
        self.ctx.events.send(JobEvent::Started {
            job_id: self.ctx.events.job_id(),
            label: self.spec.label.clone(),
        });
        let terminal = match self.execute() {
            Ok(()) => {
                self.log(Severity::Success, "All parts processed");
                JobState::Completed
            }
            Err(Interrupt::Cancelled) => {
                let message = match &self.current {
                    Some((file_base, part)) => format!(
                        "Job cancelled at {} part {}; partial files kept",
                        file_base, part
                    ),
                    None => "Job cancelled; partial files kept".to_string(),
                };
                self.log(Severity::Warning, message);
                JobState::Cancelled
            }
            Err(Interrupt::Fatal(message)) => {
                self.log(Severity::Error, message);
                JobState::Error
            }
        };
        self.set_state(terminal.clone());
        terminal
    }

    fn execute(&mut self) -> Result<(), Interrupt> {
        self.set_state(JobState::ResolvingPlan);
        self.log(Severity::Info, format!("Fetching page: {}", self.spec.label));
        let plan = self
            .spec
            .source
            .resolve_plan()
            .map_err(|e| Interrupt::Fatal(e.to_string()))?;
        self.check_cancel()?;

        self.log(Severity::Info, "Processing links...");
        if plan.is_empty() {
            return Err(Interrupt::Fatal("no links found".to_string()));
        }
        std::fs::create_dir_all(&self.spec.downloads_dir).map_err(|e| {
            Interrupt::Fatal(format!(
                "cannot create downloads directory {}: {}",
                self.spec.downloads_dir.display(),
                e
            ))
        })?;

        let hosts = host_order(&plan, self.spec.host_order.as_deref());
        self.total_parts = plan.total_parts();
        self.log(
            Severity::Info,
            format!(
                "Found {} part(s) across host(s): {}",
                self.total_parts,
                hosts.join(", ")
            ),
        );

        for (file_base, parts) in plan.files() {
            let max_part = parts.keys().next_back().copied().unwrap_or(0);
            for part_number in 1..=max_part {
                self.check_cancel()?;
                self.part_index += 1;
                let touched_network =
                    self.run_part(file_base, part_number, parts.get(&part_number), &hosts)?;
                if touched_network && self.part_index < self.total_parts {
                    self.pause(self.spec.part_pause)?;
                }
            }
        }
        Ok(())
    }

    /// Returns whether any host was contacted (which earns the courtesy pause).
    fn run_part(
        &mut self,
        file_base: &str,
        part_number: u32,
        links: Option<&HostLinks>,
        hosts: &[String],
    ) -> Result<bool, Interrupt> {
        let desc = PartDescriptor::new(
            file_base,
            part_number,
            &self.spec.archive_extension,
            &self.spec.downloads_dir,
        );
        let part = PartRef::from(&desc);
        self.current = Some((file_base.to_string(), part_number));
        self.set_state(self.transferring());

        if let Ok(meta) = std::fs::metadata(&desc.destination_path) {
            self.log(
                Severity::Info,
                format!("{} already exists, skipping", desc.target_filename),
            );
            self.finish_part(
                part,
                PartOutcome::Skipped {
                    existing_bytes: meta.len(),
                },
            );
            return Ok(false);
        }

        let Some(links) = links else {
            self.log(
                Severity::Warning,
                format!("Part {} of {} is missing from the plan", part_number, file_base),
            );
            self.finish_part(part, PartOutcome::Missing);
            return Ok(false);
        };

        self.confirm_gate(&part)?;

        for host in hosts {
            let Some(url) = links.get(host) else {
                continue;
            };
            self.check_cancel()?;
            if let Some(bytes) = self.try_host(&desc, host, url)? {
                self.finish_part(
                    part,
                    PartOutcome::Downloaded {
                        host: host.clone(),
                        bytes,
                    },
                );
                return Ok(true);
            }
        }

        self.log(
            Severity::Warning,
            format!("Failed to download {} from any host", desc.target_filename),
        );
        self.finish_part(part, PartOutcome::Failed);
        Ok(true)
    }

    /// One host attempt: resolve, then fetch. `Ok(None)` means try the next host.
    fn try_host(
        &mut self,
        desc: &PartDescriptor,
        host: &str,
        url: &str,
    ) -> Result<Option<u64>, Interrupt> {
        self.set_state(JobState::ResolvingLink);
        self.log(
            Severity::Debug,
            format!("Resolving {} link for {}", host, desc.target_filename),
        );
        let direct = match self.ctx.resolver.resolve(url) {
            Ok(direct) => direct,
            Err(e) => {
                self.log(
                    Severity::Warning,
                    format!("Could not resolve {} link for {}: {}", host, desc.target_filename, e),
                );
                return Ok(None);
            }
        };
        self.check_cancel()?;

        self.set_state(self.transferring());
        self.log(
            Severity::Download,
            format!("Downloading {} from {}", desc.target_filename, host),
        );
        let relay = ProgressRelay {
            events: &self.ctx.events,
            target: &desc.target_filename,
            part_index: self.part_index,
            total_parts: self.total_parts,
        };
        let fetched = self.ctx.transfer.fetch(
            &direct,
            &desc.destination_path,
            &self.spec.retry,
            &self.ctx.cancel,
            &relay,
        );
        match fetched {
            Ok(outcome) => {
                let note = if outcome.already_complete {
                    " (already complete on server)"
                } else {
                    ""
                };
                self.log(
                    Severity::Success,
                    format!(
                        "Downloaded {} from {} ({} bytes){}",
                        desc.target_filename, host, outcome.file_size, note
                    ),
                );
                Ok(Some(outcome.file_size))
            }
            Err(TransferError::Cancelled) => Err(Interrupt::Cancelled),
            Err(e) => {
                self.log(
                    Severity::Error,
                    format!("Download of {} from {} failed: {}", desc.target_filename, host, e),
                );
                Ok(None)
            }
        }
    }

    fn confirm_gate(&mut self, part: &PartRef) -> Result<(), Interrupt> {
        if self.spec.strategy != Strategy::Manual {
            return Ok(());
        }
        self.ctx.gate.drain();
        self.set_state(JobState::AwaitingConfirmation);
        self.ctx.events.send(JobEvent::AwaitingConfirmation {
            job_id: self.ctx.events.job_id(),
            part: part.clone(),
        });
        self.log(
            Severity::Info,
            format!("Waiting for confirmation to download {}", part.target_filename),
        );
        match self.ctx.gate.wait(self.spec.confirm_timeout, &self.ctx.cancel) {
            GateOutcome::Confirmed => Ok(()),
            GateOutcome::TimedOut => {
                self.log(
                    Severity::Warning,
                    format!(
                        "No confirmation within {:?}, proceeding with {}",
                        self.spec.confirm_timeout, part.target_filename
                    ),
                );
                Ok(())
            }
            GateOutcome::Cancelled => Err(Interrupt::Cancelled),
        }
    }

    fn pause(&self, duration: Duration) -> Result<(), Interrupt> {
        if duration.is_zero() || self.ctx.cancel.sleep(duration) {
            Ok(())
        } else {
            Err(Interrupt::Cancelled)
        }
    }

    fn check_cancel(&self) -> Result<(), Interrupt> {
        if self.ctx.cancel.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn transferring(&self) -> JobState {
        JobState::Transferring {
            part_index: self.part_index,
            total_parts: self.total_parts,
        }
    }

    fn set_state(&mut self, state: JobState) {
        if self.state != state {
            self.state = state.clone();
            self.ctx.events.status(state);
        }
    }

    fn finish_part(&self, part: PartRef, outcome: PartOutcome) {
        self.ctx.events.send(JobEvent::PartFinished {
            job_id: self.ctx.events.job_id(),
            part,
            outcome,
        });
    }

    fn log(&self, level: Severity, message: impl Into<String>) {
        self.ctx.events.log(level, message);
    }
}

/// Forwards transfer callbacks as job events.
struct ProgressRelay<'a> {
    events: &'a Emitter,
    target: &'a str,
    part_index: u32,
    total_parts: u32,
}

impl TransferObserver for ProgressRelay<'_> {
    fn on_progress(&self, bytes_downloaded: u64, total_bytes: u64) {
        self.events.send(JobEvent::Progress {
            job_id: self.events.job_id(),
            bytes_downloaded,
            total_bytes,
            part_index: self.part_index,
            total_parts: self.total_parts,
        });
    }

    fn on_resume(&self, offset: u64) {
        self.events.log(
            Severity::Info,
            format!("Resuming {} from byte {}", self.target, offset),
        );
    }

    fn on_restart(&self, discarded: u64) {
        self.events.log(
            Severity::Warning,
            format!(
                "Server ignored resume for {}; restarting ({} bytes discarded)",
                self.target, discarded
            ),
        );
    }

    fn on_retry(&self, retry: u32, max_retries: u32, error: &TransferError, delay: Duration) {
        self.events.log(
            Severity::Warning,
            format!(
                "{} failed: {}; retry {}/{} in {:.1}s",
                self.target,
                error,
                retry,
                max_retries,
                delay.as_secs_f64()
            ),
        );
    }
}
