//! Runtime configuration for the itemboard client.
//!
//! Read once at startup from `itemboard.toml`, then overridden from the
//! environment. A missing endpoint, region or API key is fatal to the binary;
//! nothing past startup consults this crate.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "itemboard.toml";

pub const ENV_ENDPOINT: &str = "ITEMBOARD_APPSYNC_ENDPOINT";
pub const ENV_REGION: &str = "ITEMBOARD_AWS_REGION";
pub const ENV_API_KEY: &str = "ITEMBOARD_APPSYNC_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("missing required setting(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid endpoint {0:?}: expected an http(s) URL")]
    InvalidEndpoint(String),
}

/// Top-level configuration (persisted as `itemboard.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub realtime: RealtimeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    /// GraphQL HTTP endpoint, e.g. `https://<id>.appsync-api.<region>.amazonaws.com/graphql`.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeSettings {
    /// Quiet period after a channel failure before status flips back and a
    /// full reload runs.
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,
    #[serde(default)]
    pub delete_signal: DeleteSignal,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            recovery_delay_secs: default_recovery_delay_secs(),
            delete_signal: DeleteSignal::default(),
            recovery: RecoveryPolicy::default(),
        }
    }
}

/// What the `onDeleteItem` subscription delivers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteSignal {
    /// Boolean payload only; every push forces a full reload.
    #[default]
    Opaque,
    /// Payload carries the deleted item's id.
    IdBearing,
}

/// What happens to a failed push channel once the recovery delay elapses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Release the failed channel and subscribe again, then resync.
    #[default]
    Resubscribe,
    /// Leave the channel alone and only resync; relies on the transport to
    /// reconnect by itself.
    ResyncOnly,
}

impl RuntimeConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    /// Apply `ITEMBOARD_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.api.endpoint = endpoint;
        }
        if let Some(region) = get(ENV_REGION) {
            self.api.region = region;
        }
        if let Some(api_key) = get(ENV_API_KEY) {
            self.api.api_key = api_key;
        }
    }

    /// Check that everything needed to reach the backend is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.api.endpoint.trim().is_empty() {
            missing.push("api.endpoint");
        }
        if self.api.region.trim().is_empty() {
            missing.push("api.region");
        }
        if self.api.api_key.trim().is_empty() {
            missing.push("api.api_key");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let endpoint = self.api.endpoint.trim();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(())
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    10
}
fn default_recovery_delay_secs() -> u64 {
    5
}
