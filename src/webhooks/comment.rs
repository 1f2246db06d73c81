use regex::RegexSet;
use std::sync::OnceLock;
use tracing::info;

use crate::database::{Database, NewReviewComment};
use crate::error::PrequelError;
use crate::github::types;
use crate::staleness;
use crate::webhooks::pull_request::upsert_pull_request;
use crate::webhooks::WebhookOutcome;

/// Review commands in priority order. The first one found in a body wins.
const COMMANDS: [&str; 4] = ["LGTM", "APPROVE", "REQUEST CHANGES", "NEED REVIEW"];

pub fn detect_command(body: &str) -> Option<&'static str> {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        RegexSet::new(COMMANDS.iter().map(|c| format!("(?i){}", regex::escape(c))))
            .expect("command patterns are valid")
    });

    let matches = patterns.matches(body);
    matches.iter().next().map(|index| COMMANDS[index])
}

pub async fn handle_review_comment_event(
    database: &Database,
    event: &types::ReviewCommentEvent,
) -> Result<WebhookOutcome, PrequelError> {
    let comment = &event.comment;
    info!(
        "Review comment {} by {} on PR #{} in {}",
        event.action, comment.user.login, event.pull_request.number, event.repository.full_name
    );

    if !matches!(event.action.as_str(), "created" | "edited") {
        return Ok(WebhookOutcome::ignored());
    }

    let mut pr = upsert_pull_request(database, &event.repository, &event.pull_request).await?;
    let author_id = database
        .upsert_user(comment.user.id, &comment.user.login, &comment.user.avatar_url)
        .await?;

    let command_type = detect_command(&comment.body);
    if let Some(command) = command_type {
        info!("Detected {} command from {}", command, comment.user.login);
    }

    database
        .upsert_review_comment(&NewReviewComment {
            github_id: comment.id,
            review_id: None,
            pull_request_id: pr.id,
            author_id,
            body: comment.body.clone(),
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            command_type: command_type.map(str::to_string),
        })
        .await?;

    if pr.state.is_open() && staleness::record_activity(&mut pr, comment.updated_at) {
        database.save_activity(&pr).await?;
    }

    Ok(WebhookOutcome {
        message: "Comment processed",
        events: Vec::new(),
    })
}
