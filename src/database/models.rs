use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PrequelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PrState::Open)
    }
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrState {
    type Err = PrequelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            "merged" => Ok(PrState::Merged),
            other => Err(PrequelError::ValidationError(format!(
                "Unknown pull request state: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub github_id: i64,
    pub repository_id: i64,
    pub author_id: i64,
    pub title: String,
    pub number: i64,
    pub state: PrState,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub is_stale: bool,
}

/// Pull request joined with the names the dashboard and Slack messages show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestSummary {
    #[serde(flatten)]
    pub pull_request: PullRequest,
    pub repository_name: String,
    pub author_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl ReviewState {
    /// GitHub sends `changes_requested` in webhooks and `CHANGES_REQUESTED` from the REST API.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "approved" => ReviewState::Approved,
            "changes_requested" => ReviewState::ChangesRequested,
            "commented" => ReviewState::Commented,
            "dismissed" => ReviewState::Dismissed,
            _ => ReviewState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Approved => "approved",
            ReviewState::ChangesRequested => "changes_requested",
            ReviewState::Commented => "commented",
            ReviewState::Dismissed => "dismissed",
            ReviewState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalePrHistory {
    pub id: i64,
    pub pull_request_id: i64,
    pub marked_stale_at: DateTime<Utc>,
    pub marked_active_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrMetrics {
    pub pr_authors: Vec<(String, i64)>,
    pub active_reviewers: Vec<(String, i64)>,
    pub command_users: Vec<(String, i64)>,
    pub stale_pr_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub id: i64,
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub pr_count: i64,
    pub review_count: i64,
    pub stale_pr_count: i64,
    pub contributor_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorStats {
    pub id: i64,
    pub github_id: i64,
    pub username: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    pub pr_count: i64,
    pub review_count: i64,
    pub command_count: i64,
    pub repositories: Vec<String>,
}
