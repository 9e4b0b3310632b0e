use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::job::Strategy;
use crate::retry::RetryPolicy;

/// Default unrestrict endpoint (Real-Debrid REST API).
pub const DEFAULT_UNRESTRICT_ENDPOINT: &str = "https://api.real-debrid.com/rest/1.0/unrestrict/link";

/// Environment variable that supplies the unrestrict token when the config has none.
pub const TOKEN_ENV_VAR: &str = "MIRRORFETCH_TOKEN";

/// Retry parameters for a single part transfer (`[retry]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = try once).
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds.
    pub delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_secs: 5.0,
        }
    }
}

impl RetryConfig {
    /// Negative delays count as zero. Infinite or out-of-range delays are rejected.
    pub fn policy(&self) -> Result<RetryPolicy> {
        let delay = Duration::try_from_secs_f64(self.delay_secs.max(0.0))
            .with_context(|| format!("invalid retry delay_secs {}", self.delay_secs))?;
        Ok(RetryPolicy::new(self.max_retries, delay))
    }
}

/// Per-request HTTP timeouts (`[http]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort a transfer whose throughput stays at zero for this long.
    pub stall_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            stall_timeout_secs: 60,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }
}

/// Unrestrict service settings (`[unrestrict]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrestrictConfig {
    pub endpoint: String,
    /// Bearer token; `MIRRORFETCH_TOKEN` is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for UnrestrictConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UNRESTRICT_ENDPOINT.to_string(),
            token: None,
        }
    }
}

impl UnrestrictConfig {
    /// Token from config, falling back to the environment.
    pub fn effective_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Engine configuration loaded from `~/.config/mirrorfetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory all parts are written to.
    pub downloads_dir: PathBuf,
    pub strategy: Strategy,
    /// Preferred host order; when unset every host in the plan is tried in sorted order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_order: Option<Vec<String>>,
    /// Extension appended to `{file_base}.part{N}`.
    pub archive_extension: String,
    /// Pause between parts, in milliseconds (0 disables it).
    pub part_pause_ms: u64,
    /// How long a manual-strategy job waits for confirmation before proceeding.
    pub confirm_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub unrestrict: UnrestrictConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            strategy: Strategy::Auto,
            host_order: None,
            archive_extension: "rar".to_string(),
            part_pause_ms: 1000,
            confirm_timeout_secs: 60,
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            unrestrict: UnrestrictConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Renders the config as it would be written to `config.toml`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config")
    }

    pub fn part_pause(&self) -> Duration {
        Duration::from_millis(self.part_pause_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Checks values that deserialize fine but cannot be turned into job settings.
    pub fn validate(&self) -> Result<()> {
        if self.retry.delay_secs.is_nan() {
            anyhow::bail!("invalid retry delay_secs NaN");
        }
        self.retry.policy()?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mirrorfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
