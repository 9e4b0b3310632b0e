//! `mirrorfetch config` – show where the config lives and what is in effect.

use anyhow::Result;
use mirrorfetch_core::config::{self, EngineConfig};

pub fn run_config(cfg: &EngineConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    let mut shown = cfg.clone();
    if let Some(token) = shown.unrestrict.effective_token() {
        shown.unrestrict.token = Some(redact(&token));
    }
    print!("{}", shown.to_toml()?);
    Ok(())
}

/// Keeps the last four characters of a token.
fn redact(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}
