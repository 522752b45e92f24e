//! Settings file and environment loading.
//!
//! `~/.relay/config.json` is read first; if it does not exist `./relay.toml`
//! is tried. Environment variables are applied on top of whichever was found.

use std::path::{Path, PathBuf};

use anyhow::Context;
use relay_core::RelayConfig;
use relay_llm::ProviderSettings;
use serde::{Deserialize, Serialize};

pub const CONFIG_JSON: &str = "config.json";
pub const CONFIG_TOML: &str = "relay.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub provider: ProviderSettings,
    #[serde(flatten)]
    pub relay: RelayConfig,
}

/// `~/.relay`, or `./.relay` when no home directory is known.
pub fn relay_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

impl CliConfig {
    /// Load from the default locations and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        let mut config = Self::load_from(&relay_dir(), &cwd)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read `<relay_dir>/config.json`, else `<cwd>/relay.toml`, else defaults.
    pub fn load_from(relay_dir: &Path, cwd: &Path) -> anyhow::Result<Self> {
        let json_path = relay_dir.join(CONFIG_JSON);
        if json_path.exists() {
            let content = std::fs::read_to_string(&json_path)
                .with_context(|| format!("Failed to read {}", json_path.display()))?;
            let config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", json_path.display()))?;
            log::debug!("[Config] Loaded {}", json_path.display());
            return Ok(config);
        }

        let toml_path = cwd.join(CONFIG_TOML);
        if toml_path.exists() {
            let content = std::fs::read_to_string(&toml_path)
                .with_context(|| format!("Failed to read {}", toml_path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", toml_path.display()))?;
            log::debug!("[Config] Loaded {}", toml_path.display());
            return Ok(config);
        }

        log::debug!("[Config] No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply environment overrides. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("GOOGLE_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(project_id) = get("GOOGLE_PROJECT_ID") {
            self.provider.project_id = Some(project_id);
        }
        if let Some(location) = get("GOOGLE_LOC") {
            self.provider.location = Some(location);
        }
        if let Some(token) = get("GOOGLE_ACCESS_TOKEN") {
            self.provider.access_token = Some(token);
        }
        if let Some(model) = get("RELAY_MODEL") {
            self.provider.model = Some(model);
        }
        if let Some(base_url) = get("RELAY_BASE_URL") {
            self.provider.base_url = Some(base_url);
        }
        if let Some(rate) = get("RELAY_STREAM_RATE") {
            match rate.parse::<u64>() {
                Ok(ms) => self.relay.stream.chunk_delay_ms = Some(ms),
                Err(_) => log::warn!("[Config] Ignoring RELAY_STREAM_RATE={:?}: not a number of milliseconds", rate),
            }
        }
    }
}
