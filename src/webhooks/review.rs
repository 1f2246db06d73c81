use tracing::info;

use crate::database::models::ReviewState;
use crate::database::{Database, NewReviewComment};
use crate::error::PrequelError;
use crate::github::types;
use crate::notifications::DomainEvent;
use crate::staleness;
use crate::webhooks::comment::detect_command;
use crate::webhooks::pull_request::upsert_pull_request;
use crate::webhooks::WebhookOutcome;

/// Review bodies are stored as comments under an id offset from the review id,
/// keeping them apart from GitHub's own comment ids.
const REVIEW_BODY_ID_OFFSET: i64 = 10_000_000_000;

pub async fn handle_review_event(
    database: &Database,
    event: &types::PullRequestReviewEvent,
) -> Result<WebhookOutcome, PrequelError> {
    let review = &event.review;
    info!(
        "Review {} by {} for PR #{} in {}",
        review.state, review.user.login, event.pull_request.number, event.repository.full_name
    );

    if event.action != "submitted" {
        return Ok(WebhookOutcome::ignored());
    }

    let mut pr = upsert_pull_request(database, &event.repository, &event.pull_request).await?;
    let reviewer_id = database
        .upsert_user(review.user.id, &review.user.login, &review.user.avatar_url)
        .await?;

    let state = ReviewState::parse(&review.state);
    let submitted_at = review.submitted_at.unwrap_or(event.pull_request.updated_at);
    let review_id = database
        .upsert_review(review.id, pr.id, reviewer_id, state, submitted_at)
        .await?;

    if let Some(body) = review.body.as_deref().filter(|b| !b.trim().is_empty()) {
        database
            .upsert_review_comment(&NewReviewComment {
                github_id: review.id + REVIEW_BODY_ID_OFFSET,
                review_id: Some(review_id),
                pull_request_id: pr.id,
                author_id: reviewer_id,
                body: body.to_string(),
                created_at: submitted_at,
                updated_at: submitted_at,
                command_type: detect_command(body).map(str::to_string),
            })
            .await?;
    }

    if pr.state.is_open() && staleness::record_activity(&mut pr, submitted_at) {
        database.save_activity(&pr).await?;
    }

    Ok(WebhookOutcome {
        message: "Review processed",
        events: vec![DomainEvent::ReviewStateChanged {
            event_id: review.id.to_string(),
            pull_request_id: pr.id,
            state,
            reviewer: Some(review.user.login.clone()),
            occurred_at: submitted_at,
        }],
    })
}
