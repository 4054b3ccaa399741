//! Configuration management for selfheal
//!
//! Settings are layered: built-in defaults, then `~/.config/selfheal/config.json`,
//! then environment variables, then command-line flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Region used when neither the config file nor `AWS_REGION` names one
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
/// Low temperature keeps fixes close to deterministic
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

pub const REGION_ENV: &str = "AWS_REGION";
pub const MODEL_ENV: &str = "SELFHEAL_MODEL_ID";
pub const ENDPOINT_ENV: &str = "SELFHEAL_ENDPOINT";
pub const API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service region for the model endpoint
    pub region: String,
    pub model_id: String,
    /// Upper bound on generated tokens per fix
    pub max_tokens: u32,
    pub temperature: f32,
    /// Full base URL replacing the regional endpoint (proxies, local gateways)
    pub endpoint: Option<String>,
    /// Treat a response without a fenced code block as a failure
    pub require_fence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            endpoint: None,
            require_fence: false,
        }
    }
}

/// Values supplied on the command line; `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub region: Option<String>,
    pub model_id: Option<String>,
    pub endpoint: Option<String>,
    pub require_fence: bool,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("selfheal"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Resolve the effective configuration for this process.
    pub fn resolve(overrides: &ConfigOverrides) -> Self {
        let mut config = Self::load();
        config.apply_env(|name| std::env::var(name).ok());
        config.apply_overrides(overrides);
        config
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from a specific file. A missing file yields defaults; a
    /// corrupt one is moved aside so the next run starts clean.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    "Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    /// Apply environment variables through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(region) = non_empty(REGION_ENV) {
            self.region = region;
        }
        if let Some(model_id) = non_empty(MODEL_ENV) {
            self.model_id = model_id;
        }
        if let Some(endpoint) = non_empty(ENDPOINT_ENV) {
            self.endpoint = Some(endpoint);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(region) = &overrides.region {
            self.region = region.clone();
        }
        if let Some(model_id) = &overrides.model_id {
            self.model_id = model_id.clone();
        }
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        if overrides.require_fence {
            self.require_fence = true;
        }
    }

    /// Get the API key from the environment. It is never stored on disk.
    pub fn api_key() -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/selfheal/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
