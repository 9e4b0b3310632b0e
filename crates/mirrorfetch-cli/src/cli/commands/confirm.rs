//! `mirrorfetch confirm <id>` – let a manual-strategy job fetch its next part.

use anyhow::Result;
use mirrorfetch_core::job::JobId;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_confirm(id: u64) -> Result<()> {
    let path = mirrorfetch_core::control::default_control_socket_path()?;
    let reply = control_socket::send_command(&path, ControlCommand::Confirm(JobId(id))).await?;
    if reply != "ok" {
        anyhow::bail!("{}", reply);
    }
    println!("Confirmed job {id}");
    Ok(())
}
