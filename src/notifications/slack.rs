//! Slack incoming-webhook channel.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::notifications::error::ChannelError;
use crate::notifications::message::NotificationMessage;
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::settings::NotificationConfig;

#[derive(Debug, Serialize)]
struct SlackPayload {
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SlackBlock {
    Header { text: SlackText },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<SlackText>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<SlackText>,
    },
    Actions { elements: Vec<SlackButton> },
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

impl SlackText {
    fn plain(text: &str) -> Self {
        Self {
            kind: "plain_text",
            text: text.to_string(),
        }
    }

    fn markdown(text: &str) -> Self {
        Self {
            kind: "mrkdwn",
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SlackButton {
    #[serde(rename = "type")]
    kind: &'static str,
    text: SlackText,
    url: String,
}

/// Posts Block Kit messages to the webhook URL from the current settings.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn format_payload(message: &NotificationMessage) -> SlackPayload {
        let mut blocks = vec![
            SlackBlock::Header {
                text: SlackText::plain(&message.title),
            },
            SlackBlock::Section {
                text: Some(SlackText::markdown(&message.text)),
                fields: Vec::new(),
            },
        ];

        if !message.fields.is_empty() {
            blocks.push(SlackBlock::Section {
                text: None,
                fields: message
                    .fields
                    .iter()
                    .map(|field| SlackText::markdown(field))
                    .collect(),
            });
        }

        if !message.actions.is_empty() {
            blocks.push(SlackBlock::Actions {
                elements: message
                    .actions
                    .iter()
                    .map(|action| SlackButton {
                        kind: "button",
                        text: SlackText::plain(&action.text),
                        url: action.url.clone(),
                    })
                    .collect(),
            });
        }

        SlackPayload { blocks }
    }
}

impl Default for SlackNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(
        &self,
        config: &NotificationConfig,
        event: &NotificationEvent,
        message: &NotificationMessage,
    ) -> Result<(), ChannelError> {
        let webhook_url = config
            .webhook_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ChannelError::NotConfigured("Slack webhook URL not set".to_string()))?;

        let payload = Self::format_payload(message);
        debug!("Sending {} notification to Slack", event.kind);

        let response = self.client.post(webhook_url).json(&payload).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!("Slack accepted {}", event.dedupe_key);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("Slack webhook returned {}: {}", status, body);
            Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
