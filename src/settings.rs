//! Runtime settings shared by the stale checker, the notification policy and the API
//!
//! Settings are replaced as a whole. Readers take an `Arc` snapshot and keep using
//! it even if an update lands while they work.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::PrequelError;
use crate::notifications::NotificationKind;
use crate::staleness::StalenessThreshold;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub enable_slack_notifications: bool,
    #[serde(default = "default_true")]
    pub notify_on_new_pr: bool,
    #[serde(default = "default_true")]
    pub notify_on_changes_requested: bool,
    #[serde(default = "default_true")]
    pub notify_on_stale_pr: bool,
    #[serde(default, alias = "SLACK_WEBHOOK_URL", alias = "slackWebhookUrl")]
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_slack_notifications: false,
            notify_on_new_pr: true,
            notify_on_changes_requested: true,
            notify_on_stale_pr: true,
            webhook_url: None,
        }
    }
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), PrequelError> {
        let has_url = self
            .webhook_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false);

        if self.enable_slack_notifications && !has_url {
            return Err(PrequelError::missing_webhook_url());
        }
        Ok(())
    }

    /// Per-kind toggle. The global switch is checked separately.
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::PrCreated => self.notify_on_new_pr,
            NotificationKind::ChangesRequested => self.notify_on_changes_requested,
            NotificationKind::PrStale => self.notify_on_stale_pr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub stale_pr_days: StalenessThreshold,
    #[serde(flatten)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stale_pr_days: StalenessThreshold::default(),
            notifications: NotificationConfig::default(),
            github_token: None,
            organization_name: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), PrequelError> {
        self.notifications.validate()
    }

    /// API view that never echoes the GitHub token back.
    pub fn redacted(&self) -> SettingsView {
        SettingsView {
            stale_pr_days: self.stale_pr_days.days(),
            notifications: self.notifications.clone(),
            github_token_configured: self.github_token.is_some(),
            organization_name: self.organization_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub stale_pr_days: u32,
    #[serde(flatten)]
    pub notifications: NotificationConfig,
    pub github_token_configured: bool,
    pub organization_name: Option<String>,
}

/// Partial update submitted by the setup wizard or the settings page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub stale_pr_days: Option<i64>,
    pub enable_slack_notifications: Option<bool>,
    pub notify_on_new_pr: Option<bool>,
    pub notify_on_changes_requested: Option<bool>,
    pub notify_on_stale_pr: Option<bool>,
    #[serde(alias = "SLACK_WEBHOOK_URL", alias = "slackWebhookUrl")]
    pub webhook_url: Option<String>,
    pub github_token: Option<String>,
    pub organization_name: Option<String>,
}

impl SettingsPatch {
    /// Merges the patch onto `base`. Values are validated as a whole afterwards.
    pub fn apply_to(&self, base: &Settings) -> Result<Settings, PrequelError> {
        let mut next = base.clone();

        if let Some(days) = self.stale_pr_days {
            next.stale_pr_days = StalenessThreshold::try_new(days)?;
        }
        if let Some(enabled) = self.enable_slack_notifications {
            next.notifications.enable_slack_notifications = enabled;
        }
        if let Some(on) = self.notify_on_new_pr {
            next.notifications.notify_on_new_pr = on;
        }
        if let Some(on) = self.notify_on_changes_requested {
            next.notifications.notify_on_changes_requested = on;
        }
        if let Some(on) = self.notify_on_stale_pr {
            next.notifications.notify_on_stale_pr = on;
        }
        if let Some(url) = &self.webhook_url {
            next.notifications.webhook_url = non_empty(url);
        }
        if let Some(token) = &self.github_token {
            next.github_token = non_empty(token);
        }
        if let Some(org) = &self.organization_name {
            next.organization_name = non_empty(org);
        }

        next.validate()?;
        Ok(next)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Clone)]
pub enum ConfigState {
    NotLoaded,
    Loaded(Arc<Settings>),
}

impl ConfigState {
    pub fn settings(&self) -> Option<Arc<Settings>> {
        match self {
            ConfigState::NotLoaded => None,
            ConfigState::Loaded(settings) => Some(settings.clone()),
        }
    }
}

pub struct SettingsStore {
    state: RwLock<ConfigState>,
    /// Serializes patch-then-persist writers. Readers never wait on it.
    writer: Mutex<()>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConfigState::NotLoaded),
            writer: Mutex::new(()),
        }
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            state: RwLock::new(ConfigState::Loaded(Arc::new(settings))),
            writer: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConfigState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> Option<Arc<Settings>> {
        self.state().settings()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state(), ConfigState::Loaded(_))
    }

    /// Replaces every field at once. Invalid settings leave the store untouched.
    pub fn update(&self, settings: Settings) -> Result<Arc<Settings>, PrequelError> {
        settings.validate()?;
        let settings = Arc::new(settings);
        self.swap(settings.clone());
        info!(
            "Settings updated (stalePrDays={}, slack={})",
            settings.stale_pr_days.days(),
            settings.notifications.enable_slack_notifications
        );
        Ok(settings)
    }

    /// Merges `patch` onto the current settings, hands the result to `persist`, and
    /// only then makes it visible. A validation or persistence error leaves the
    /// store unchanged. Concurrent patches are applied one after another.
    pub async fn apply_patch<F, Fut>(
        &self,
        patch: &SettingsPatch,
        persist: F,
    ) -> Result<Arc<Settings>, PrequelError>
    where
        F: FnOnce(Arc<Settings>) -> Fut,
        Fut: Future<Output = Result<(), PrequelError>>,
    {
        let _writer = self.writer.lock().await;
        let base = self.snapshot().unwrap_or_default();
        let next = Arc::new(patch.apply_to(&base)?);

        persist(next.clone()).await?;

        self.swap(next.clone());
        info!("Settings patched (stalePrDays={})", next.stale_pr_days.days());
        Ok(next)
    }

    fn swap(&self, settings: Arc<Settings>) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = ConfigState::Loaded(settings);
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}
