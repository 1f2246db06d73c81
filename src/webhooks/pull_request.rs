use tracing::{debug, info};

use crate::database::models::{PrState, PullRequest};
use crate::database::{Database, NewPullRequest};
use crate::error::PrequelError;
use crate::github::types;
use crate::notifications::DomainEvent;
use crate::staleness;
use crate::webhooks::WebhookOutcome;

/// Stores the repository, author and pull request of a payload, returning the
/// stored row. Known pull requests are returned as stored.
pub async fn upsert_pull_request(
    database: &Database,
    repository: &types::Repository,
    pr: &types::PullRequest,
) -> Result<PullRequest, PrequelError> {
    if let Some(existing) = database.get_pull_request_by_github_id(pr.id).await? {
        return Ok(existing);
    }

    let repository_id = database
        .upsert_repository(repository.id, &repository.name, &repository.full_name)
        .await?;
    let author_id = database
        .upsert_user(pr.user.id, &pr.user.login, &pr.user.avatar_url)
        .await?;

    let stored = database
        .insert_pull_request(&NewPullRequest {
            github_id: pr.id,
            repository_id,
            author_id,
            title: pr.title.clone(),
            number: pr.number,
            state: pr.pr_state(),
            html_url: pr.html_url.clone(),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            closed_at: pr.closed_at,
            merged_at: pr.merged_at,
        })
        .await?;

    debug!("PR #{} in {} stored as {}", pr.number, repository.full_name, stored.id);
    Ok(stored)
}

pub async fn handle_pull_request_event(
    database: &Database,
    event: &types::PullRequestEvent,
) -> Result<WebhookOutcome, PrequelError> {
    let remote = &event.pull_request;
    info!(
        "Pull request action {} for PR #{} in {}",
        event.action, remote.number, event.repository.full_name
    );

    if !matches!(
        event.action.as_str(),
        "opened" | "reopened" | "synchronize" | "edited" | "closed"
    ) {
        return Ok(WebhookOutcome::ignored());
    }

    // Keep the author current even for PRs we already know.
    database
        .upsert_user(remote.user.id, &remote.user.login, &remote.user.avatar_url)
        .await?;
    let mut pr = upsert_pull_request(database, &event.repository, remote).await?;
    let mut events = Vec::new();

    let new_state = remote.pr_state();
    let changed_at = match new_state {
        PrState::Merged => remote.merged_at.unwrap_or(remote.updated_at),
        PrState::Closed => remote.closed_at.unwrap_or(remote.updated_at),
        PrState::Open => remote.updated_at,
    };

    if let Some(transition) = staleness::apply_state_change(&mut pr, new_state, changed_at) {
        database.record_stale_transition(&transition).await?;
        events.push(DomainEvent::StalenessTransition(transition));
    }

    if pr.state.is_open() {
        staleness::record_activity(&mut pr, remote.updated_at);
    }
    pr.title = remote.title.clone();
    pr.html_url = remote.html_url.clone();
    pr.updated_at = pr.updated_at.max(remote.updated_at);
    database.save_pull_request(&pr).await?;

    if event.action == "opened" {
        events.push(DomainEvent::PrCreated {
            event_id: remote.id.to_string(),
            pull_request_id: pr.id,
            occurred_at: remote.created_at,
        });
    }

    Ok(WebhookOutcome {
        message: "PR processed",
        events,
    })
}
