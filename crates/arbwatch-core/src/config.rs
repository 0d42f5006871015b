//! Client and application configuration.
//!
//! `ClientConfig` holds what the API client needs at construction (base URL,
//! timeout, CSRF cookie/header names). `Config` is the small persisted user
//! config stored at `~/.config/arbwatch/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "arbwatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base URL used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Cookie the server uses to hand out the CSRF token
const DEFAULT_CSRF_COOKIE: &str = "csrf_token";

/// Header the CSRF token is echoed back in
const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";

pub const ENV_API_URL: &str = "ARBWATCH_API_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "ARBWATCH_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub csrf_cookie: String,
    pub csrf_header: String,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            csrf_cookie: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
        })
    }

    /// Build from `ARBWATCH_API_URL` / `ARBWATCH_REQUEST_TIMEOUT_SECS`,
    /// falling back to `fallback_url` and the default timeout.
    pub fn from_env(fallback_url: Option<&str>) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), fallback_url)
    }

    fn from_lookup<F>(lookup: F, fallback_url: Option<&str>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_API_URL)
            .or_else(|| fallback_url.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&url)?;

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_REQUEST_TIMEOUT, raw))?;
            if secs == 0 {
                return Err(anyhow!("{} must be greater than zero", ENV_REQUEST_TIMEOUT));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Resolve an API path such as `/auth/me` against the base URL.
    ///
    /// Absolute URLs and paths that resolve to another origin are rejected,
    /// so the bearer token and CSRF header only ever reach the API host.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid API path: {}", path))?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            return Err(anyhow!("API path escapes {}: {}", self.base_url, path));
        }
        Ok(url)
    }
}

/// Parse a base URL, making sure it ends in `/` so paths join beneath it.
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = Url::parse(&normalized).with_context(|| format!("Invalid API URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("Unsupported API URL scheme: {}", other)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Read settings from `path`, or defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Malformed config file {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to encode config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Client settings: environment first, then this file, then defaults.
    pub fn client_config(&self) -> Result<ClientConfig> {
        ClientConfig::from_env(self.api_url.as_deref())
    }
}
