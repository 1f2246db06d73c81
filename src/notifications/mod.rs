//! Notification eligibility and delivery
//!
//! - [`policy::NotificationPolicy`] turns domain events into eligible notifications
//! - [`message`] renders them into Slack-style messages
//! - [`NotificationSender`] implementations deliver them
//! - [`dispatch::deliver`] ties the three together and records successful deliveries

pub mod dispatch;
pub mod error;
pub mod message;
pub mod policy;
pub mod slack;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::database::models::ReviewState;
use crate::settings::NotificationConfig;
use crate::staleness::StalenessTransition;

pub use dispatch::{deliver, DeliveryFailure, DispatchReport};
pub use error::ChannelError;
pub use message::NotificationMessage;
pub use policy::NotificationPolicy;
pub use slack::SlackNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PrCreated,
    ChangesRequested,
    PrStale,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PrCreated => "pr_created",
            NotificationKind::ChangesRequested => "changes_requested",
            NotificationKind::PrStale => "pr_stale",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a pull request and may warrant a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    PrCreated {
        event_id: String,
        pull_request_id: i64,
        occurred_at: DateTime<Utc>,
    },
    ReviewStateChanged {
        event_id: String,
        pull_request_id: i64,
        state: ReviewState,
        reviewer: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    StalenessTransition(StalenessTransition),
    /// Event whose kind could not be recognized. Always dropped.
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub pull_request_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub dedupe_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl NotificationEvent {
    /// Stale notifications share one key per pull request per UTC day. Other kinds are
    /// keyed by the originating event so each event notifies at most once.
    pub fn dedupe_key_for(
        kind: NotificationKind,
        pull_request_id: i64,
        occurred_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> String {
        match (kind, event_id) {
            (NotificationKind::PrStale, _) | (_, None) => format!(
                "{}:{}:{}",
                kind,
                pull_request_id,
                occurred_at.format("%Y-%m-%d")
            ),
            (_, Some(event_id)) => format!("{}:{}:{}", kind, pull_request_id, event_id),
        }
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        config: &NotificationConfig,
        event: &NotificationEvent,
        message: &NotificationMessage,
    ) -> Result<(), ChannelError>;
}

/// Logs notifications instead of delivering them.
pub struct NoopSender;

#[async_trait]
impl NotificationSender for NoopSender {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn send(
        &self,
        _config: &NotificationConfig,
        event: &NotificationEvent,
        message: &NotificationMessage,
    ) -> Result<(), ChannelError> {
        info!("[DRY-RUN] {} notification {}: {}", event.kind, event.dedupe_key, message.title);
        Ok(())
    }
}
