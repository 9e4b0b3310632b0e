//! CLI for the mirrorfetch download engine.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mirrorfetch_core::config::{self, EngineConfig};
use mirrorfetch_core::job::Strategy;
use std::path::PathBuf;

use commands::{run_cancel, run_config, run_confirm, run_fetch, run_plan};

/// Top-level CLI for mirrorfetch.
#[derive(Debug, Parser)]
#[command(name = "mirrorfetch")]
#[command(about = "mirrorfetch: multi-host, multi-part archive downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Group the mirror links in each list file and print the plan as JSON.
    Plan {
        /// Text files with one mirror URL per line.
        #[arg(required = true, value_name = "LIST")]
        lists: Vec<PathBuf>,
        /// Host try-order (repeatable); defaults to all hosts, sorted.
        #[arg(long = "host", value_name = "HOST")]
        hosts: Vec<String>,
    },

    /// Download every part in each list file (one job per file, run concurrently).
    Fetch(FetchArgs),

    /// Cancel a job running in another `mirrorfetch fetch`.
    Cancel {
        /// Job identifier.
        id: u64,
    },

    /// Confirm the next part of a manual-strategy job.
    Confirm {
        /// Job identifier.
        id: u64,
    },

    /// Show the config file path and effective settings.
    Config,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Text files with one mirror URL per line.
    #[arg(required = true, value_name = "LIST")]
    pub lists: Vec<PathBuf>,
    /// `auto` downloads straight through; `manual` waits for confirmation before each part.
    #[arg(long)]
    pub strategy: Option<Strategy>,
    /// Host try-order (repeatable); hosts not listed are skipped.
    #[arg(long = "host", value_name = "HOST")]
    pub hosts: Vec<String>,
    /// Retries per part transfer after the first attempt.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
    /// Delay between retries, in seconds.
    #[arg(long, value_name = "SECS")]
    pub retry_delay: Option<f64>,
    /// Directory the parts are written to.
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,
    /// Unrestrict API token (overrides config and environment).
    #[arg(long)]
    pub token: Option<String>,
    /// Treat mirror links as direct download URLs; skip the unrestrict service.
    #[arg(long)]
    pub direct: bool,
    /// Print events as JSON lines instead of human-readable output.
    #[arg(long)]
    pub json: bool,
}

impl FetchArgs {
    /// Applies command-line overrides on top of the loaded config.
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy;
        }
        if !self.hosts.is_empty() {
            cfg.host_order = Some(self.hosts.clone());
        }
        if let Some(n) = self.max_retries {
            cfg.retry.max_retries = n;
        }
        if let Some(secs) = self.retry_delay {
            cfg.retry.delay_secs = secs;
        }
        if let Some(dir) = &self.downloads_dir {
            cfg.downloads_dir = dir.clone();
        }
        if let Some(token) = &self.token {
            cfg.unrestrict.token = Some(token.clone());
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!(
            downloads_dir = %cfg.downloads_dir.display(),
            strategy = ?cfg.strategy,
            "loaded config"
        );

        match cli.command {
            CliCommand::Plan { lists, hosts } => run_plan(&lists, &hosts)?,
            CliCommand::Fetch(args) => run_fetch(cfg, args).await?,
            CliCommand::Cancel { id } => run_cancel(id).await?,
            CliCommand::Confirm { id } => run_confirm(id).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
