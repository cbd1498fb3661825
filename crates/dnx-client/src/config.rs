//! TOML-backed client (worker agent) configuration, loaded once at
//! startup by `dnxcld`.

use std::fs;
use std::path::Path;

use dnx_core::{DnxError, DnxResult};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Management listener's own passive URL.
    #[serde(default = "default_agent_url")]
    pub agent_url: String,
    /// Server's dispatch channel: where worker threads register and
    /// receive jobs.
    pub dispatcher_url: String,
    /// Server's collect channel: where worker threads send results.
    pub collector_url: String,
    /// Optional absolute prefix prepended to argv[0]'s basename before
    /// exec; empty means "run under the shell's PATH".
    #[serde(default)]
    pub plugin_path: String,
    #[serde(default = "default_pool_min")]
    pub pool_min: usize,
    #[serde(default = "default_pool_initial")]
    pub pool_initial: usize,
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    #[serde(default = "default_pool_increment")]
    pub pool_increment: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ttl_backoff_secs")]
    pub ttl_backoff_secs: u64,
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,
    /// Empty disables PID file writing (e.g. when run with `-d`/foreground
    /// during development).
    #[serde(default)]
    pub pid_file: String,
}

fn default_agent_url() -> String {
    "udp://0.0.0.0:12482".to_string()
}
fn default_pool_min() -> usize {
    1
}
fn default_pool_initial() -> usize {
    3
}
fn default_pool_max() -> usize {
    20
}
fn default_pool_increment() -> usize {
    3
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_ttl_backoff_secs() -> u64 {
    5
}
fn default_max_consecutive_timeouts() -> u32 {
    3
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> DnxResult<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| DnxError::Open(format!("reading {}: {e}", path.as_ref().display())))?;
        let cfg: ClientConfig =
            toml::from_str(&text).map_err(|e| DnxError::Syntax(format!("parsing config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> DnxResult<()> {
        if !(self.pool_min <= self.pool_initial && self.pool_initial <= self.pool_max) {
            return Err(DnxError::Invalid(
                "pool_min <= pool_initial <= pool_max must hold".to_string(),
            ));
        }
        if self.pool_min < 1 {
            return Err(DnxError::Invalid("pool_min must be >= 1".to_string()));
        }
        if self.ttl_backoff_secs < 1 || self.request_timeout_secs <= self.ttl_backoff_secs {
            return Err(DnxError::Invalid(
                "request_timeout_secs must be > ttl_backoff_secs >= 1".to_string(),
            ));
        }
        if self.pool_increment < 1 {
            return Err(DnxError::Invalid("pool_increment must be >= 1".to_string()));
        }
        Ok(())
    }

    /// The TTL a worker advertises in its `NodeRequest`: always strictly
    /// less than `request_timeout_secs`, so a worker's own receive
    /// timeout outlives the time the server will honour its token.
    pub fn token_ttl_secs(&self) -> u64 {
        self.request_timeout_secs - self.ttl_backoff_secs
    }
}
