//! Dashboard and settings endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::app::AppState;
use crate::database::models::{ContributorStats, PrMetrics, PullRequestSummary, RepositoryStats};
use crate::database::Queries;
use crate::error::PrequelError;
use crate::github::{BranchProtectionRules, GitHubClient};
use crate::scheduler::{PassOptions, PassOutcome};
use crate::settings::SettingsPatch;
use crate::workflows::{self, WorkflowMetrics, WorkflowRunSummary};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "prequel",
        "timestamp": chrono::Utc::now()
    }))
}

pub async fn get_metrics(State(state): State<AppState>) -> Result<Json<PrMetrics>, PrequelError> {
    let metrics = Queries::get_pr_metrics(state.database.pool()).await?;
    Ok(Json(metrics))
}

pub async fn get_stale_prs(
    State(state): State<AppState>,
) -> Result<Json<Vec<PullRequestSummary>>, PrequelError> {
    let stale = Queries::get_stale_prs(state.database.pool()).await?;
    Ok(Json(stale))
}

pub async fn get_pull_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<PullRequestSummary>>, PrequelError> {
    let prs = Queries::list_pull_requests(state.database.pool()).await?;
    Ok(Json(prs))
}

pub async fn get_repositories(
    State(state): State<AppState>,
) -> Result<Json<Vec<RepositoryStats>>, PrequelError> {
    let repositories = Queries::repositories_with_stats(state.database.pool()).await?;
    Ok(Json(repositories))
}

pub async fn get_contributors(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContributorStats>>, PrequelError> {
    let contributors = Queries::contributors_with_stats(state.database.pool()).await?;
    Ok(Json(contributors))
}

pub async fn get_configuration(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), PrequelError> {
    let Some(settings) = state.settings.snapshot() else {
        return Ok((StatusCode::NOT_FOUND, Json(json!({"configured": false}))));
    };

    let mut body = serde_json::to_value(settings.redacted())?;
    body["configured"] = json!(true);
    Ok((StatusCode::OK, Json(body)))
}

/// Shared by the setup wizard's save and the settings page's update.
pub async fn save_configuration(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Value>, PrequelError> {
    let database = state.database.clone();
    let settings = state
        .settings
        .apply_patch(&patch, |next| async move {
            database.save_settings(&next).await.map_err(|e| {
                error!("Settings not persisted, keeping the previous values: {}", e);
                e
            })
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "configuration": settings.redacted()
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    #[serde(default, alias = "githubToken")]
    pub token: Option<String>,
}

pub async fn validate_github_token(
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> Result<Json<Value>, PrequelError> {
    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| state.settings.snapshot().and_then(|s| s.github_token.clone()));

    let Some(token) = token else {
        return Ok(Json(json!({"valid": false, "error": "No GitHub token provided"})));
    };

    let client = GitHubClient::new(&token, &state.config.github_api_url)?;
    let valid = client.validate_token().await?;
    Ok(Json(json!({ "valid": valid })))
}

#[derive(Debug, Default, Deserialize)]
pub struct StaleCheckQuery {
    #[serde(default)]
    pub dry_run: bool,
    pub days: Option<i64>,
}

pub async fn run_stale_check(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Query(query): Query<StaleCheckQuery>,
) -> Result<Json<PassOutcome>, PrequelError> {
    info!("On-demand stale check requested for {}", organization);
    let outcome = state
        .stale_check
        .run_pass_with(
            &organization,
            PassOptions {
                dry_run: query.dry_run,
                threshold_override: query.days,
                ..PassOptions::default()
            },
        )
        .await?;
    Ok(Json(outcome))
}

/// Client for the stored token, falling back to `GITHUB_TOKEN`.
fn github_client(state: &AppState) -> Result<GitHubClient, PrequelError> {
    let token = state
        .settings
        .snapshot()
        .and_then(|s| s.github_token.clone())
        .or_else(|| state.config.github_token.clone())
        .ok_or_else(|| PrequelError::ValidationError("GitHub token not configured".to_string()))?;
    GitHubClient::new(&token, &state.config.github_api_url)
}

async fn tracked_workflow_runs(state: &AppState) -> Result<Vec<WorkflowRunSummary>, PrequelError> {
    let client = github_client(state)?;
    let organization = state.settings.snapshot().and_then(|s| s.organization_name.clone());
    let repositories = state
        .database
        .repository_names(organization.as_deref())
        .await?;
    workflows::recent_runs(&client, &repositories, chrono::Utc::now()).await
}

pub async fn get_workflow_runs(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowRunSummary>>, PrequelError> {
    Ok(Json(tracked_workflow_runs(&state).await?))
}

pub async fn get_workflow_metrics(
    State(state): State<AppState>,
) -> Result<Json<WorkflowMetrics>, PrequelError> {
    let runs = tracked_workflow_runs(&state).await?;
    Ok(Json(workflows::summarize(&runs)))
}

#[derive(Debug, Deserialize)]
pub struct BranchProtectionRequest {
    /// `owner/name`, or a bare name inside the configured organization.
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub rules: BranchProtectionRules,
}

pub async fn setup_branch_protection(
    State(state): State<AppState>,
    Json(request): Json<BranchProtectionRequest>,
) -> Result<Json<Value>, PrequelError> {
    let (owner, repo) = match request.repo.split_once('/') {
        Some((owner, repo)) => (owner.to_string(), repo.to_string()),
        None => {
            let owner = state
                .settings
                .snapshot()
                .and_then(|s| s.organization_name.clone())
                .ok_or_else(|| {
                    PrequelError::ValidationError(format!(
                        "Repository {} needs an owner or a configured organization",
                        request.repo
                    ))
                })?;
            (owner, request.repo.clone())
        }
    };
    if request.branch.trim().is_empty() {
        return Err(PrequelError::ValidationError("Branch name is required".to_string()));
    }

    request.rules.validate()?;
    github_client(&state)?
        .protect_branch(&owner, &repo, &request.branch, &request.rules)
        .await?;

    Ok(Json(json!({
        "success": true,
        "repository": format!("{}/{}", owner, repo),
        "branch": request.branch
    })))
}
