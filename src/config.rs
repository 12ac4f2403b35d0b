// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::events::AlertThresholds;

const ENV_PATH: &str = "INDEXPULSE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/indexpulse.toml";

/// Runtime configuration. Every field has a compiled default so the
/// service runs with no config file at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mandatory timeout applied to every upstream request.
    pub request_timeout_secs: u64,

    /// Per-pipeline cadences.
    pub quotes_interval_secs: u64,
    pub premium_interval_secs: u64,
    pub flow_interval_secs: u64,
    pub macro_interval_secs: u64,

    /// Consecutive failed cycles before a pipeline is flagged stale.
    pub stale_after_failures: u32,

    /// Alert dedup window. Heuristic, deliberately configurable.
    pub event_cooldown_secs: i64,
    /// Retained events before the oldest are pruned.
    pub event_retention: usize,
    /// Retained history entries per snapshot key.
    pub history_retention: usize,

    pub thresholds: AlertThresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            quotes_interval_secs: 60,
            premium_interval_secs: 300,
            flow_interval_secs: 300,
            macro_interval_secs: 1800,
            stale_after_failures: 3,
            event_cooldown_secs: 1800,
            event_retention: 500,
            history_retention: 2000,
            thresholds: AlertThresholds::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $INDEXPULSE_CONFIG_PATH
    /// 2) config/indexpulse.toml
    /// 3) compiled defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("INDEXPULSE_CONFIG_PATH points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }
}
