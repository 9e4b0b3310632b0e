//! Control socket: server (during `mirrorfetch fetch`) and client (`cancel` / `confirm`).
//! Protocol: one line per command, "cancel <id>" or "confirm <id>"; the server answers
//! one line, "ok" or "unknown job <id>".

use anyhow::{Context, Result};
use mirrorfetch_core::job::JobId;
use mirrorfetch_core::registry::JobRegistry;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Cancel(JobId),
    Confirm(JobId),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let (verb, id) = line.trim().split_once(' ')?;
        let id = JobId(id.trim().parse().ok()?);
        match verb {
            "cancel" => Some(ControlCommand::Cancel(id)),
            "confirm" => Some(ControlCommand::Confirm(id)),
            _ => None,
        }
    }

    fn to_line(self) -> String {
        match self {
            ControlCommand::Cancel(id) => format!("cancel {}\n", id),
            ControlCommand::Confirm(id) => format!("confirm {}\n", id),
        }
    }

    fn apply(self, registry: &JobRegistry) -> String {
        let (id, found) = match self {
            ControlCommand::Cancel(id) => (id, registry.cancel(id)),
            ControlCommand::Confirm(id) => (id, registry.confirm(id)),
        };
        if found {
            "ok".to_string()
        } else {
            format!("unknown job {}", id)
        }
    }
}

/// Spawns a task that listens on `path` and applies each command line to `registry`.
/// Malformed lines are ignored.
pub fn spawn_control_listener(
    registry: JobRegistry,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create control socket dir {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            let Some(cmd) = ControlCommand::parse(&line) else {
                                tracing::debug!(line = %line.trim(), "ignoring control line");
                                continue;
                            };
                            let reply = cmd.apply(&registry);
                            tracing::info!(?cmd, %reply, "control command");
                            if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command and returns the server's reply line.
pub async fn send_command(socket_path: &Path, cmd: ControlCommand) -> Result<String> {
    if !socket_path.exists() {
        anyhow::bail!(
            "no running `mirrorfetch fetch` (control socket {} not found)",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(cmd.to_line().as_bytes()).await?;
    let mut reply = String::new();
    BufReader::new(read)
        .read_line(&mut reply)
        .await
        .context("read control reply")?;
    Ok(reply.trim().to_string())
}
