//! Client configuration: REST and push endpoints plus sync tuning.
//!
//! Stored at `<home>/.workplace/config.yaml`. Every field has a default, so a
//! missing file or a partial file is valid.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::{io_err, StoreError};
use crate::paths::{config_path, ensure_root, home, write_atomic};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_PUSH_URL: &str = "http://localhost:5000";

/// Build flavour the client believes it is running as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base path the REST endpoints hang off, e.g. `https://hr.example.com/api`.
    pub api_base_url: String,
    /// Origin of the push channel server.
    pub push_url: String,
    pub environment: Environment,
    /// Collapse push events whose id is already known into the existing entry.
    pub push_dedup: bool,
    /// Fall back to Engine.IO long-polling when the WebSocket cannot be opened.
    pub push_polling_fallback: bool,
    /// Reconnect attempts after the push channel drops; 0 disables reconnects.
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    /// Refresh interval used by front ends while the push channel is down.
    pub poll_interval_secs: u64,
    /// Per-request timeout; `None` keeps the HTTP client's defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            environment: Environment::default(),
            push_dedup: true,
            push_polling_fallback: true,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            poll_interval_secs: 30,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn api_base(&self) -> Result<Url, StoreError> {
        parse_url("api_base_url", &self.api_base_url)
    }

    pub fn push_endpoint(&self) -> Result<Url, StoreError> {
        parse_url("push_url", &self.push_url)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// The YAML document `save_at` writes.
    pub fn to_yaml(&self) -> Result<String, StoreError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// False when a production build points the push channel at a local
    /// address.
    pub fn push_endpoint_allowed(&self) -> Result<bool, StoreError> {
        let endpoint = self.push_endpoint()?;
        Ok(self.environment != Environment::Production || !is_loopback_url(&endpoint))
    }
}

/// Whether `url` targets this machine (`localhost`, loopback or unspecified IPs).
pub fn is_loopback_url(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip == Ipv4Addr::UNSPECIFIED,
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip == Ipv6Addr::UNSPECIFIED,
        None => false,
    }
}

/// Load the config, falling back to defaults when the file does not exist.
pub fn load_at(home: &Path) -> Result<Config, StoreError> {
    let path = config_path(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => return Err(io_err(&path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })?;
    config.api_base()?;
    config.push_endpoint()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, StoreError> {
    load_at(&home()?)
}

/// Atomically write `config` to `<home>/.workplace/config.yaml`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), StoreError> {
    ensure_root(home)?;
    write_atomic(&config_path(home), &config.to_yaml()?)
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), StoreError> {
    save_at(&home()?, config)
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, StoreError> {
    Url::parse(value).map_err(|source| StoreError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}
