use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PrequelError;
use crate::github::client::DEFAULT_API_URL;
use crate::settings::{NotificationConfig, Settings};
use crate::staleness::StalenessThreshold;

/// Process-level configuration. Runtime settings that can change while the
/// server runs live in [`crate::settings::SettingsStore`]; the values here only
/// seed them on first start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub github_webhook_secret: Option<String>,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub stale_pr_days: i64,
    pub slack_webhook_url: Option<String>,
    pub stale_check_interval_secs: u64,
}

impl AppConfig {
    /// Defaults, then `prequel.toml` if present, then the environment.
    pub fn load() -> Result<Self, PrequelError> {
        let config = Self::defaults()?
            .add_source(File::with_name("prequel").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Defaults overlaid with a single file, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self, PrequelError> {
        let config = Self::defaults()?
            .add_source(File::from(path))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, PrequelError> {
        Ok(config::Config::builder()
            .set_default("database_url", "sqlite://prequel.db")?
            .set_default("github_api_url", DEFAULT_API_URL)?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 5000)?
            .set_default("stale_pr_days", 7)?
            .set_default("stale_check_interval_secs", 86_400)?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Settings used when nothing has been saved yet.
    pub fn seed_settings(&self) -> Settings {
        let webhook_url = self
            .slack_webhook_url
            .clone()
            .filter(|url| !url.trim().is_empty());

        Settings {
            stale_pr_days: StalenessThreshold::new(self.stale_pr_days),
            notifications: NotificationConfig {
                enable_slack_notifications: webhook_url.is_some(),
                webhook_url,
                ..NotificationConfig::default()
            },
            github_token: self.github_token.clone().filter(|t| !t.is_empty()),
            organization_name: None,
        }
    }
}
