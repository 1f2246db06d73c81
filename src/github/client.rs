use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::database::models::PrState;
use crate::database::{Database, NewPullRequest};
use crate::error::PrequelError;
use crate::github::protection::BranchProtectionRules;
use crate::github::types;
use crate::staleness;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const WORKFLOW_RUNS_PER_REPOSITORY: &str = "30";

/// Counts from one repository sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub imported: usize,
    pub updated: usize,
    pub reopened: usize,
    pub closed: usize,
}

pub struct GitHubClient {
    client: octocrab::Octocrab,
}

impl GitHubClient {
    pub fn new(token: &str, api_url: &str) -> Result<Self, PrequelError> {
        let client = octocrab::Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(api_url)
            .map_err(|e| PrequelError::ConfigError(format!("Invalid GitHub API URL: {}", e)))?
            .build()
            .map_err(|e| {
                PrequelError::GitHubError(format!("Failed to create GitHub client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Returns `false` for rejected tokens and `Err` only when GitHub is unreachable.
    pub async fn validate_token(&self) -> Result<bool, PrequelError> {
        match self.client.get::<types::User, _, ()>("/user", None).await {
            Ok(user) => {
                info!("GitHub token authenticates as {}", user.login);
                Ok(true)
            }
            Err(octocrab::Error::GitHub { source, .. }) => {
                warn!("GitHub token rejected: {}", source.message);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<types::PullRequest>, PrequelError> {
        let route = format!("/repos/{}/{}/pulls", owner, repo);
        let prs: Vec<types::PullRequest> = self
            .client
            .get(route, Some(&[("state", "open"), ("per_page", "100")]))
            .await?;
        Ok(prs)
    }

    pub async fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<types::PullRequest, PrequelError> {
        let route = format!("/repos/{}/{}/pulls/{}", owner, repo, number);
        Ok(self.client.get(route, None::<&()>).await?)
    }

    /// Reconciles the stored pull requests of `owner/repo` with GitHub.
    ///
    /// - unknown open PRs are imported
    /// - known PRs have their activity clock advanced, and are reopened if stored as closed
    /// - stored open PRs missing from GitHub's open list get their final state applied
    ///
    /// State changes go through the same rules as webhooks, so a stale PR that turns
    /// out to be closed has its flag cleared and its history row closed.
    pub async fn sync_open_pull_requests(
        &self,
        database: &Database,
        owner: &str,
        repo: &str,
    ) -> Result<SyncReport, PrequelError> {
        let route = format!("/repos/{}/{}", owner, repo);
        let repository: types::Repository = self.client.get(route, None::<&()>).await?;
        let repository_id = database
            .upsert_repository(repository.id, &repository.name, &repository.full_name)
            .await?;

        let mut report = SyncReport::default();
        let mut listed = HashSet::new();

        for remote in self.open_pull_requests(owner, repo).await? {
            listed.insert(remote.id);
            let author_id = database
                .upsert_user(remote.user.id, &remote.user.login, &remote.user.avatar_url)
                .await?;

            match database.get_pull_request_by_github_id(remote.id).await? {
                Some(mut existing) => {
                    let reopened = !existing.state.is_open();
                    if reopened {
                        debug!("PR #{} is open on GitHub, reopening", remote.number);
                        staleness::apply_state_change(&mut existing, PrState::Open, remote.updated_at);
                        report.reopened += 1;
                    }
                    let advanced = staleness::record_activity(&mut existing, remote.updated_at);
                    if advanced && !reopened {
                        report.updated += 1;
                    }
                    if reopened || advanced {
                        existing.title = remote.title.clone();
                        database.save_pull_request(&existing).await?;
                    }
                }
                None => {
                    database
                        .insert_pull_request(&NewPullRequest {
                            github_id: remote.id,
                            repository_id,
                            author_id,
                            title: remote.title.clone(),
                            number: remote.number,
                            state: remote.pr_state(),
                            html_url: remote.html_url.clone(),
                            created_at: remote.created_at,
                            updated_at: remote.updated_at,
                            closed_at: remote.closed_at,
                            merged_at: remote.merged_at,
                        })
                        .await?;
                    report.imported += 1;
                    debug!("Imported PR #{} from {}", remote.number, repository.full_name);
                }
            }
        }

        for mut local in database.open_pull_requests_for_repository(repository_id).await? {
            if listed.contains(&local.github_id) {
                continue;
            }

            let remote = self.pull_request(owner, repo, local.number).await?;
            let new_state = remote.pr_state();
            let changed_at = match new_state {
                // Past the first page of the open list.
                PrState::Open => continue,
                PrState::Merged => remote.merged_at.or(remote.closed_at),
                PrState::Closed => remote.closed_at,
            }
            .unwrap_or(remote.updated_at);

            if let Some(transition) = staleness::apply_state_change(&mut local, new_state, changed_at) {
                database.record_stale_transition(&transition).await?;
            }
            database.save_pull_request(&local).await?;
            report.closed += 1;
            info!("PR #{} in {} was {} on GitHub", local.number, repository.full_name, new_state);
        }

        info!(
            "Synced {}: {} imported, {} updated, {} reopened, {} closed",
            repository.full_name, report.imported, report.updated, report.reopened, report.closed
        );
        Ok(report)
    }

    pub async fn workflow_runs(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<types::WorkflowRun>, PrequelError> {
        let route = format!("/repos/{}/{}/actions/runs", owner, repo);
        let list: types::WorkflowRunList = self
            .client
            .get(route, Some(&[("per_page", WORKFLOW_RUNS_PER_REPOSITORY)]))
            .await?;
        debug!(
            "Fetched {} of {} workflow runs for {}/{}",
            list.workflow_runs.len(),
            list.total_count,
            owner,
            repo
        );
        Ok(list.workflow_runs)
    }

    pub async fn protect_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        rules: &BranchProtectionRules,
    ) -> Result<(), PrequelError> {
        rules.validate()?;
        let route = format!("/repos/{}/{}/branches/{}/protection", owner, repo, branch);
        let _: serde_json::Value = self.client.put(route, Some(&rules.to_request())).await?;
        info!("Branch protection applied to {}/{}:{}", owner, repo, branch);
        Ok(())
    }
}
