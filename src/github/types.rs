use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::PrState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: bool,
}

impl PullRequest {
    /// GitHub reports merged pull requests as `closed`; the merge timestamp tells them apart.
    pub fn pr_state(&self) -> PrState {
        if self.merged || self.merged_at.is_some() {
            PrState::Merged
        } else if self.state.eq_ignore_ascii_case("closed") {
            PrState::Closed
        } else {
            PrState::Open
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub user: User,
    pub body: Option<String>,
    pub state: String,
    pub html_url: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user: User,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pull_request_review_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestReviewEvent {
    pub action: String,
    pub review: Review,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewCommentEvent {
    pub action: String,
    pub comment: Comment,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub total_count: i64,
    pub workflow_runs: Vec<WorkflowRun>,
}

/// A GitHub Actions run. `conclusion` is only set once `status` is `completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub actor: Option<User>,
    pub triggering_actor: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr_json(state: &str, merged_at: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": 1001,
            "number": 7,
            "title": "Add retries",
            "body": null,
            "state": state,
            "html_url": "https://github.com/acme/api/pull/7",
            "user": { "id": 5, "login": "octocat" },
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T10:00:00Z",
            "closed_at": merged_at,
            "merged_at": merged_at
        })
    }

    #[test]
    fn merged_prs_are_distinguished_from_closed() {
        let open: PullRequest = serde_json::from_value(pr_json("open", None)).unwrap();
        let closed: PullRequest = serde_json::from_value(pr_json("closed", None)).unwrap();
        let merged: PullRequest =
            serde_json::from_value(pr_json("closed", Some("2024-05-03T10:00:00Z"))).unwrap();

        assert_eq!(open.pr_state(), PrState::Open);
        assert_eq!(closed.pr_state(), PrState::Closed);
        assert_eq!(merged.pr_state(), PrState::Merged);
        assert_eq!(open.user.avatar_url, "");
    }
}
