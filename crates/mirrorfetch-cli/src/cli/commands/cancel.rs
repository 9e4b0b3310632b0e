//! `mirrorfetch cancel <id>` – cancel a job in a running `mirrorfetch fetch`.

use anyhow::Result;
use mirrorfetch_core::job::JobId;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_cancel(id: u64) -> Result<()> {
    let path = mirrorfetch_core::control::default_control_socket_path()?;
    let reply = control_socket::send_command(&path, ControlCommand::Cancel(JobId(id))).await?;
    if reply != "ok" {
        anyhow::bail!("{}", reply);
    }
    println!("Cancel requested for job {id}");
    Ok(())
}
