pub mod account;
pub mod config;
pub mod notifications;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use workplace_core::{config as config_store, session, Config, Session};
use workplace_sync::{AlertSink, NotificationSync};

/// Endpoint overrides accepted by every command.
#[derive(Args, Debug, Default)]
pub struct EndpointArgs {
    /// REST base URL, overriding `api_base_url` from the config file.
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Push server URL, overriding `push_url` from the config file.
    #[arg(long, global = true, value_name = "URL")]
    pub push_url: Option<String>,
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Config file values with command-line overrides applied.
pub fn load_config(home: &Path, endpoints: &EndpointArgs) -> Result<Config> {
    let mut config = config_store::load_at(home).context("failed to load configuration")?;
    if let Some(url) = &endpoints.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(url) = &endpoints.push_url {
        config.push_url = url.clone();
    }
    config.api_base().context("invalid --api-url")?;
    config.push_endpoint().context("invalid --push-url")?;
    Ok(config)
}

pub fn load_session(home: &Path) -> Result<Session> {
    session::load_at(home).context("run `workplace login` first")
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Sync service for the stored session. Must be called inside the runtime.
pub fn start_sync(
    config: Config,
    session: Session,
    alerts: Arc<dyn AlertSink>,
) -> Result<NotificationSync> {
    NotificationSync::start(config, session, alerts).context("failed to set up notification client")
}

/// "5m ago" style age for table output.
pub fn format_age(at: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(at).num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }
    match seconds {
        0..=59 => format!("{seconds}s ago"),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_use_largest_unit() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(5)), "5s ago");
        assert_eq!(format_age(now - Duration::minutes(7)), "7m ago");
        assert_eq!(format_age(now - Duration::hours(3)), "3h ago");
        assert_eq!(format_age(now - Duration::days(2)), "2d ago");
        assert_eq!(format_age(now + Duration::minutes(1)), "just now");
    }

    #[test]
    fn overrides_replace_file_values() {
        let home = tempfile::TempDir::new().expect("home");
        let endpoints = EndpointArgs {
            api_url: Some("https://hr.example.com/api".into()),
            push_url: None,
        };
        let config = load_config(home.path(), &endpoints).expect("config");
        assert_eq!(config.api_base_url, "https://hr.example.com/api");
        assert_eq!(config.push_url, Config::default().push_url);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let home = tempfile::TempDir::new().expect("home");
        let endpoints = EndpointArgs {
            api_url: Some("not a url".into()),
            push_url: None,
        };
        assert!(load_config(home.path(), &endpoints).is_err());
    }
}
