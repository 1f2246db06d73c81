//! GitHub webhook ingestion
//!
//! Each handler stores what a payload tells us and returns the domain events it
//! produced. [`github::handle_webhook`] verifies the request and feeds those
//! events through the notification policy.

pub mod comment;
pub mod github;
pub mod pull_request;
pub mod review;

use crate::notifications::DomainEvent;

#[derive(Debug, Default)]
pub struct WebhookOutcome {
    pub message: &'static str,
    pub events: Vec<DomainEvent>,
}

impl WebhookOutcome {
    pub fn ignored() -> Self {
        Self {
            message: "Event received",
            events: Vec::new(),
        }
    }
}
