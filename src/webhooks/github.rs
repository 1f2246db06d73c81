use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::database::Database;
use crate::error::PrequelError;
use crate::github::webhooks::{EVENT_HEADER, SIGNATURE_HEADER};
use crate::github::{verify_signature, WebhookEventType};
use crate::notifications::{deliver, DispatchReport, DomainEvent};
use crate::webhooks::{comment, pull_request, review, WebhookOutcome};

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !verify_signature(&body, signature, state.config.github_webhook_secret.as_deref()) {
        error!("Webhook verification failed");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid signature"})),
        );
    }

    let event_name = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    info!("Received webhook: {}", event_name);

    let event_type = WebhookEventType::from_header(event_name);
    let outcome = match process_event(&state.database, &event_type, &body).await {
        Ok(outcome) => outcome,
        Err(e @ PrequelError::WebhookError(_)) => {
            warn!("Rejected {} payload: {}", event_name, e);
            return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
        }
        Err(e) => {
            error!("Failed to process {} event: {}", event_name, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            );
        }
    };

    let report = dispatch_events(&state, outcome.events).await;

    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": outcome.message,
            "notifications_sent": report.sent.len(),
            "notification_failures": report.failures.len(),
        })),
    )
}

async fn process_event(
    database: &Database,
    event_type: &WebhookEventType,
    body: &[u8],
) -> Result<WebhookOutcome, PrequelError> {
    match event_type {
        WebhookEventType::PullRequest => {
            let event = parse_payload(body)?;
            pull_request::handle_pull_request_event(database, &event).await
        }
        WebhookEventType::PullRequestReview => {
            let event = parse_payload(body)?;
            review::handle_review_event(database, &event).await
        }
        WebhookEventType::PullRequestReviewComment => {
            let event = parse_payload(body)?;
            comment::handle_review_comment_event(database, &event).await
        }
        WebhookEventType::Ping => Ok(WebhookOutcome {
            message: "Pong!",
            events: Vec::new(),
        }),
        WebhookEventType::Other(name) => {
            debug!("Unhandled webhook event: {}", name);
            Ok(WebhookOutcome::ignored())
        }
    }
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, PrequelError> {
    serde_json::from_slice(body)
        .map_err(|e| PrequelError::WebhookError(format!("Invalid JSON: {}", e)))
}

/// Runs webhook events through the policy against the current settings and
/// delivers whatever is eligible.
async fn dispatch_events(state: &AppState, events: Vec<DomainEvent>) -> DispatchReport {
    if events.is_empty() {
        return DispatchReport::default();
    }
    let Some(settings) = state.settings.snapshot() else {
        debug!("Settings not loaded, dropping {} webhook events", events.len());
        return DispatchReport::default();
    };

    let eligible: Vec<_> = state
        .policy
        .decide(events, &settings.notifications)
        .collect();

    deliver(
        &state.database,
        &state.policy,
        state.sender.as_ref(),
        &settings.notifications,
        eligible,
        Utc::now(),
    )
    .await
}
