//! TOML-backed server configuration, loaded once at startup.

use std::fs;
use std::path::Path;
use std::time::Duration;

use dnx_core::{DnxError, DnxResult};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    pub channel_dispatcher: String,
    pub channel_collector: String,
    #[serde(default)]
    pub auth_worker_nodes: Vec<String>,
    #[serde(default = "default_max_node_requests")]
    pub max_node_requests: usize,
    #[serde(default = "default_min_service_slots")]
    pub min_service_slots: usize,
    #[serde(default = "default_expire_poll_interval_secs")]
    pub expire_poll_interval_secs: u64,
    #[serde(default = "default_expire_max_batch")]
    pub expire_max_batch: usize,
    #[serde(default = "default_local_check_pattern")]
    pub local_check_pattern: String,
    #[serde(default)]
    pub sync_script: String,
    #[serde(default = "default_true")]
    pub audit_worker_jobs: bool,
    #[serde(default)]
    pub debug: u32,
}

fn default_max_node_requests() -> usize {
    100
}
fn default_min_service_slots() -> usize {
    100
}
fn default_expire_poll_interval_secs() -> u64 {
    5
}
fn default_expire_max_batch() -> usize {
    100
}
fn default_local_check_pattern() -> String {
    "^check_local_".to_string()
}
fn default_true() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> DnxResult<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| DnxError::Open(format!("reading {}: {e}", path.as_ref().display())))?;
        let cfg: ServerConfig =
            toml::from_str(&text).map_err(|e| DnxError::Syntax(format!("parsing config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> DnxResult<()> {
        if self.min_service_slots < 1 {
            return Err(DnxError::Invalid("min_service_slots must be >= 1".to_string()));
        }
        if self.max_node_requests < 1 {
            return Err(DnxError::Invalid("max_node_requests must be >= 1".to_string()));
        }
        if self.expire_poll_interval_secs < 1 {
            return Err(DnxError::Invalid(
                "expire_poll_interval_secs must be >= 1".to_string(),
            ));
        }
        regex::Regex::new(&self.local_check_pattern)
            .map_err(|e| DnxError::Invalid(format!("local_check_pattern: {e}")))?;
        Ok(())
    }

    pub fn expire_poll_interval(&self) -> Duration {
        Duration::from_secs(self.expire_poll_interval_secs)
    }
}
