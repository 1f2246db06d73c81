//! GitHub Actions activity for the dashboard
//!
//! Runs are fetched per tracked repository and reduced to the run list and the
//! per-workflow metrics the dashboard shows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::database::organization_of;
use crate::error::PrequelError;
use crate::github::{types, GitHubClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
    Cancelled,
    InProgress,
}

impl RunStatus {
    pub fn from_github(status: Option<&str>, conclusion: Option<&str>) -> Self {
        match (status, conclusion) {
            (Some("completed"), Some("success")) => RunStatus::Success,
            (Some("completed"), Some("cancelled" | "skipped")) => RunStatus::Cancelled,
            (Some("completed"), _) => RunStatus::Failure,
            _ => RunStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunSummary {
    pub id: i64,
    pub workflow_name: String,
    pub repository: String,
    pub status: RunStatus,
    pub duration_seconds: i64,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRunSummary {
    /// Runs still going are timed up to `now`.
    pub fn from_run(repository: &str, run: &types::WorkflowRun, now: DateTime<Utc>) -> Self {
        let status = RunStatus::from_github(run.status.as_deref(), run.conclusion.as_deref());
        let started = run.run_started_at.unwrap_or(run.created_at);
        let finished = match status {
            RunStatus::InProgress => now,
            _ => run.updated_at,
        };

        Self {
            id: run.id,
            workflow_name: run.name.clone().unwrap_or_else(|| "unnamed".to_string()),
            repository: repository.to_string(),
            status,
            duration_seconds: (finished - started).num_seconds().max(0),
            triggered_by: run
                .triggering_actor
                .as_ref()
                .or(run.actor.as_ref())
                .map(|user| user.login.clone())
                .unwrap_or_default(),
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowMetrics {
    pub total_workflows: usize,
    pub successful_workflows: usize,
    pub failed_workflows: usize,
    /// `[workflow name, average minutes]` over finished runs, longest first.
    pub workflow_run_durations: Vec<(String, f64)>,
}

pub fn summarize(runs: &[WorkflowRunSummary]) -> WorkflowMetrics {
    let mut durations: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for run in runs.iter().filter(|r| r.status != RunStatus::InProgress) {
        let entry = durations.entry(run.workflow_name.as_str()).or_default();
        entry.0 += run.duration_seconds;
        entry.1 += 1;
    }

    let mut workflow_run_durations: Vec<(String, f64)> = durations
        .into_iter()
        .map(|(name, (seconds, count))| {
            let minutes = seconds as f64 / count as f64 / 60.0;
            (name.to_string(), (minutes * 10.0).round() / 10.0)
        })
        .collect();
    workflow_run_durations.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    WorkflowMetrics {
        total_workflows: runs.len(),
        successful_workflows: runs.iter().filter(|r| r.status == RunStatus::Success).count(),
        failed_workflows: runs.iter().filter(|r| r.status == RunStatus::Failure).count(),
        workflow_run_durations,
    }
}

/// Recent runs across `repositories` (`owner/name`), newest first. A repository
/// GitHub refuses is logged and left out.
pub async fn recent_runs(
    client: &GitHubClient,
    repositories: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<WorkflowRunSummary>, PrequelError> {
    let mut summaries = Vec::new();

    for full_name in repositories {
        let owner = organization_of(full_name);
        let Some(repo) = full_name.split('/').nth(1) else {
            warn!("Skipping repository without owner: {}", full_name);
            continue;
        };

        match client.workflow_runs(owner, repo).await {
            Ok(runs) => summaries.extend(
                runs.iter()
                    .map(|run| WorkflowRunSummary::from_run(full_name, run, now)),
            ),
            Err(e) => warn!("Failed to fetch workflow runs for {}: {}", full_name, e),
        }
    }

    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(summaries)
}
