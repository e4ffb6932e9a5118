use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use client_core::{transport::websocket_url, ControllerSettings};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shared::protocol::{DEFAULT_REPLY_PREFIX, SNAPSHOT_CACHE_KEY};

pub const ENV_PREFIX: &str = "MINIAPP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub host_url: String,
    pub cache_database_url: String,
    pub reply_prefix: String,
    pub refetch_delay_ms: u64,
    pub snapshot_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host_url: "ws://127.0.0.1:8765/bot".into(),
            cache_database_url: "sqlite://./data/miniapp_cache.db".into(),
            reply_prefix: DEFAULT_REPLY_PREFIX.into(),
            refetch_delay_ms: 1500,
            snapshot_timeout_ms: 10_000,
            cache_ttl_secs: 5 * 60,
            cache_key: SNAPSHOT_CACHE_KEY.into(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        websocket_url(&self.host_url)?;
        if self.reply_prefix.trim().is_empty() {
            bail!("reply_prefix must not be empty");
        }
        if self.cache_key.trim().is_empty() {
            bail!("cache_key must not be empty");
        }
        if self.snapshot_timeout_ms == 0 {
            bail!("snapshot_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            reply_prefix: self.reply_prefix.clone(),
            refetch_delay: Duration::from_millis(self.refetch_delay_ms),
            snapshot_timeout: Duration::from_millis(self.snapshot_timeout_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_key: self.cache_key.clone(),
        }
    }
}

/// Defaults, then the optional TOML file, then `MINIAPP__*` variables.
pub fn load_settings(path: &Path) -> Result<Settings> {
    load_settings_with_env_prefix(path, ENV_PREFIX)
}

pub(crate) fn load_settings_with_env_prefix(path: &Path, env_prefix: &str) -> Result<Settings> {
    let defaults = Config::try_from(&Settings::default()).context("invalid default settings")?;
    Config::builder()
        .add_source(defaults)
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to load settings from '{}'", path.display()))?
        .try_deserialize()
        .context("failed to decode settings")
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().cache_database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
