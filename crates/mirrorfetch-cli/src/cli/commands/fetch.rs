//! `mirrorfetch fetch <LIST>...` – run one job per list file and report their events.
//!
//! Ctrl-C cancels every job (partial files stay on disk). With the manual strategy each
//! Enter on stdin confirms the job that has been waiting longest.

use anyhow::{Context, Result};
use mirrorfetch_core::config::{EngineConfig, TOKEN_ENV_VAR};
use mirrorfetch_core::control::default_control_socket_path;
use mirrorfetch_core::job::{JobEvent, JobId, JobSpec, JobState, Severity, Strategy, UrlListFile};
use mirrorfetch_core::registry::JobRegistry;
use mirrorfetch_core::resolver::{DirectResolver, Resolver, UnrestrictClient};
use mirrorfetch_core::transfer::CurlTransfer;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::cli::control_socket;
use crate::cli::FetchArgs;

const PROGRESS_INTERVAL_MS: u128 = 500;

pub async fn run_fetch(mut cfg: EngineConfig, args: FetchArgs) -> Result<()> {
    args.apply(&mut cfg);
    cfg.validate()?;
    let resolver = build_resolver(&cfg, args.direct)?;
    let transfer = Arc::new(CurlTransfer::from_config(&cfg.http));
    let (registry, mut events) = JobRegistry::new(resolver, transfer);

    let listener = start_control_socket(&registry);

    for list in &args.lists {
        let spec = JobSpec::from_config(Box::new(UrlListFile(list.clone())), &cfg)?;
        let label = spec.label.clone();
        let id = registry.start(spec);
        if !args.json {
            println!("Started job {id}: {label}");
        }
    }

    let confirmations = (cfg.strategy == Strategy::Manual).then(spawn_stdin_reader);
    let mut reporter = Reporter::new(args.json);
    let finished = drive(
        &registry,
        &mut events,
        args.lists.len(),
        confirmations,
        &mut reporter,
    )
    .await;

    if let Some((handle, path)) = listener {
        handle.abort();
        let _ = std::fs::remove_file(path);
    }

    let finished = finished?;
    let failed = finished
        .iter()
        .filter(|(_, state)| *state == JobState::Error)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} job(s) ended in error", failed, finished.len());
    }
    Ok(())
}

/// Binds the control socket so `mirrorfetch cancel` / `confirm` can reach this process.
/// Jobs still run when that fails.
fn start_control_socket(registry: &JobRegistry) -> Option<(JoinHandle<()>, PathBuf)> {
    let path = match default_control_socket_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("no control socket path: {}", e);
            return None;
        }
    };
    match control_socket::spawn_control_listener(registry.clone(), &path) {
        Ok(handle) => {
            tracing::debug!(path = %path.display(), "control socket listening");
            Some((handle, path))
        }
        Err(e) => {
            tracing::warn!("control socket unavailable: {:#}", e);
            None
        }
    }
}

fn build_resolver(cfg: &EngineConfig, direct: bool) -> Result<Arc<dyn Resolver>> {
    if direct {
        return Ok(Arc::new(DirectResolver));
    }
    let client = UnrestrictClient::from_config(&cfg.unrestrict, &cfg.http);
    if !client.has_token() {
        anyhow::bail!(
            "no unrestrict token: set [unrestrict].token in the config, export {}, pass --token, or use --direct",
            TOKEN_ENV_VAR
        );
    }
    Ok(Arc::new(client))
}

/// Forwards each stdin line as one confirmation. Runs on a plain thread so a pending
/// read never holds up runtime shutdown.
fn spawn_stdin_reader() -> UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_confirmation(rx: &mut Option<UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Pumps events until every started job has finished. Returns each job's terminal state.
async fn drive(
    registry: &JobRegistry,
    events: &mut UnboundedReceiver<JobEvent>,
    mut remaining: usize,
    mut confirmations: Option<UnboundedReceiver<()>>,
    reporter: &mut Reporter,
) -> Result<Vec<(JobId, JobState)>> {
    let mut awaiting: VecDeque<JobId> = VecDeque::new();
    let mut finished = Vec::with_capacity(remaining);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while remaining > 0 {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    JobEvent::AwaitingConfirmation { job_id, .. } => awaiting.push_back(*job_id),
                    JobEvent::Finished { job_id, state } => {
                        remaining -= 1;
                        awaiting.retain(|id| id != job_id);
                        finished.push((*job_id, state.clone()));
                    }
                    _ => {}
                }
                reporter.show(&event);
            }
            Some(()) = next_confirmation(&mut confirmations) => {
                if let Some(id) = awaiting.pop_front() {
                    registry.confirm(id);
                }
            }
            signal = &mut ctrl_c, if !interrupted => {
                signal.context("listen for Ctrl-C")?;
                interrupted = true;
                eprintln!("Interrupted; cancelling {} job(s), partial files are kept", remaining);
                registry.cancel_all();
            }
        }
    }
    Ok(finished)
}

/// Renders job events on stdout.
struct Reporter {
    json: bool,
    last_progress: Option<Instant>,
}

impl Reporter {
    fn new(json: bool) -> Self {
        Self {
            json,
            last_progress: None,
        }
    }

    fn show(&mut self, event: &JobEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("serialize event: {}", e),
            }
            return;
        }
        match event {
            JobEvent::Status { job_id, state } => println!("[job {job_id}] {state}"),
            JobEvent::AwaitingConfirmation { job_id, part } => println!(
                "[job {job_id}] Press Enter (or run `mirrorfetch confirm {job_id}`) to download {}",
                part.target_filename
            ),
            JobEvent::Progress {
                job_id,
                bytes_downloaded,
                total_bytes,
                part_index,
                total_parts,
            } => {
                let now = Instant::now();
                let due = self
                    .last_progress
                    .map(|t| now.duration_since(t).as_millis() >= PROGRESS_INTERVAL_MS)
                    .unwrap_or(true);
                if due || bytes_downloaded >= total_bytes {
                    let pct = *bytes_downloaded as f64 / (*total_bytes).max(1) as f64 * 100.0;
                    println!(
                        "[job {job_id}] part {part_index}/{total_parts}: {:.1} / {:.1} MiB ({:.1}%)",
                        *bytes_downloaded as f64 / 1_048_576.0,
                        *total_bytes as f64 / 1_048_576.0,
                        pct
                    );
                    self.last_progress = Some(now);
                }
            }
            JobEvent::Log {
                job_id,
                at,
                level,
                message,
            } if *level != Severity::Debug => {
                println!("{} [{level}] [job {job_id}] {message}", at.format("%H:%M:%S"))
            }
            JobEvent::Finished { job_id, state } => println!("[job {job_id}] finished: {state}"),
            _ => {}
        }
    }
}
