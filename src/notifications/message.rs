use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::PullRequestSummary;
use crate::notifications::{NotificationEvent, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageAction {
    pub text: String,
    pub url: String,
}

/// Channel-neutral message: a title, a markdown body, short fields and link buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub text: String,
    pub fields: Vec<String>,
    pub actions: Vec<MessageAction>,
}

pub fn render(
    event: &NotificationEvent,
    summary: &PullRequestSummary,
    now: DateTime<Utc>,
) -> NotificationMessage {
    let pr = &summary.pull_request;

    match event.kind {
        NotificationKind::PrCreated => NotificationMessage {
            title: "🔔 New Pull Request Created".to_string(),
            text: format!("*{}*", pr.title),
            fields: vec![
                format!("*Repository:* {}", summary.repository_name),
                format!("*Created by:* {}", summary.author_name),
            ],
            actions: vec![MessageAction {
                text: "View Pull Request".to_string(),
                url: pr.html_url.clone(),
            }],
        },
        NotificationKind::ChangesRequested => NotificationMessage {
            title: "⚠️ Changes Requested on Pull Request".to_string(),
            text: format!("*{}*", pr.title),
            fields: vec![
                format!("*Repository:* {}", summary.repository_name),
                format!("*PR Author:* {}", summary.author_name),
                format!(
                    "*Reviewer:* {}",
                    event.actor.as_deref().unwrap_or("unknown")
                ),
            ],
            actions: vec![MessageAction {
                text: "View Review".to_string(),
                url: pr.html_url.clone(),
            }],
        },
        NotificationKind::PrStale => {
            let inactive_days = (now - pr.last_activity_at).num_days().max(0);
            NotificationMessage {
                title: "🚨 Stale Pull Request Detected".to_string(),
                text: format!(
                    "*{} #{}*: {}\nNo activity for {} days.",
                    summary.repository_name, pr.number, pr.title, inactive_days
                ),
                fields: vec![
                    format!("*Created by:* {}", summary.author_name),
                    format!("*Inactive for:* {} days", inactive_days),
                ],
                actions: vec![MessageAction {
                    text: format!("View #{}", pr.number),
                    url: pr.html_url.clone(),
                }],
            }
        }
    }
}
