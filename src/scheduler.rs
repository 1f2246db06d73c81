//! Stale PR evaluation passes
//!
//! A pass evaluates one organization's open pull requests, writes back changed
//! flags, and hands fresh-to-stale transitions to the notification policy.
//! Passes for the same organization never overlap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::error::PrequelError;
use crate::notifications::{
    deliver, DispatchReport, DomainEvent, NotificationEvent, NotificationPolicy, NotificationSender,
};
use crate::settings::SettingsStore;
use crate::staleness::{self, StalenessThreshold, StalenessTransition};

/// Organizations with a pass currently running.
#[derive(Debug, Default)]
pub struct EvaluationLocks {
    active: Mutex<HashSet<String>>,
}

impl EvaluationLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims the organization, or returns `None` if a pass already holds it.
    pub fn try_acquire(self: &Arc<Self>, organization: &str) -> Option<PassGuard> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(organization.to_string()) {
            return None;
        }
        Some(PassGuard {
            locks: Arc::clone(self),
            organization: organization.to_string(),
        })
    }

    pub fn is_running(&self, organization: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(organization)
    }
}

/// Releases the organization when dropped, including on early return or panic.
pub struct PassGuard {
    locks: Arc<EvaluationLocks>,
    organization: String,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.locks
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.organization);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PassInProgress,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub organization: String,
    pub threshold_days: u32,
    pub evaluated: usize,
    pub stale: usize,
    pub transitions: Vec<StalenessTransition>,
    /// PRs whose row changed while the pass ran. Their result was not written.
    pub deferred: usize,
    pub eligible: Vec<NotificationEvent>,
    pub notifications: DispatchReport,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Skipped {
        organization: String,
        reason: SkipReason,
    },
    Completed(PassReport),
}

#[derive(Debug, Clone)]
pub struct PassOptions {
    pub now: DateTime<Utc>,
    pub dry_run: bool,
    pub threshold_override: Option<i64>,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            dry_run: false,
            threshold_override: None,
        }
    }
}

#[derive(Clone)]
pub struct StaleCheckService {
    database: Database,
    settings: Arc<SettingsStore>,
    policy: Arc<NotificationPolicy>,
    sender: Arc<dyn NotificationSender>,
    locks: Arc<EvaluationLocks>,
}

impl StaleCheckService {
    pub fn new(
        database: Database,
        settings: Arc<SettingsStore>,
        policy: Arc<NotificationPolicy>,
        sender: Arc<dyn NotificationSender>,
        locks: Arc<EvaluationLocks>,
    ) -> Self {
        Self {
            database,
            settings,
            policy,
            sender,
            locks,
        }
    }

    pub fn locks(&self) -> &Arc<EvaluationLocks> {
        &self.locks
    }

    pub async fn run_pass(&self, organization: &str) -> Result<PassOutcome, PrequelError> {
        self.run_pass_with(organization, PassOptions::default())
            .await
    }

    pub async fn run_pass_with(
        &self,
        organization: &str,
        options: PassOptions,
    ) -> Result<PassOutcome, PrequelError> {
        let Some(_guard) = self.locks.try_acquire(organization) else {
            info!("Stale check for {} already running, skipping", organization);
            return Ok(PassOutcome::Skipped {
                organization: organization.to_string(),
                reason: SkipReason::PassInProgress,
            });
        };

        // The whole pass works from this snapshot, even if settings change meanwhile.
        let Some(settings) = self.settings.snapshot() else {
            warn!("Settings not loaded, skipping stale check for {}", organization);
            return Ok(PassOutcome::Skipped {
                organization: organization.to_string(),
                reason: SkipReason::NotConfigured,
            });
        };

        let threshold = options
            .threshold_override
            .map(StalenessThreshold::new)
            .unwrap_or(settings.stale_pr_days);

        let prs = self.database.open_pull_requests_for_org(organization).await?;
        let evaluation = staleness::evaluate(organization, prs, threshold, options.now);

        // A webhook may touch a PR between the read above and the writes below. Such
        // PRs keep what the webhook wrote and are left for the next pass.
        let mut deferred = HashSet::new();
        if !options.dry_run {
            for pr in evaluation.changed() {
                if !self.database.save_staleness(pr, !pr.is_stale).await? {
                    warn!(
                        "PR {} changed during the stale check for {}, deferring it",
                        pr.id, organization
                    );
                    deferred.insert(pr.id);
                    continue;
                }
                for transition in evaluation
                    .transitions
                    .iter()
                    .filter(|t| t.pull_request_id == pr.id)
                {
                    self.database.record_stale_transition(transition).await?;
                }
            }
        }

        let transitions: Vec<StalenessTransition> = evaluation
            .transitions
            .iter()
            .filter(|t| !deferred.contains(&t.pull_request_id))
            .cloned()
            .collect();
        let stale = evaluation
            .updated
            .iter()
            .filter(|pr| pr.is_stale && !deferred.contains(&pr.id))
            .count();

        let events = transitions
            .iter()
            .cloned()
            .map(DomainEvent::StalenessTransition);
        let eligible: Vec<NotificationEvent> = self
            .policy
            .decide(events, &settings.notifications)
            .collect();

        let notifications = if options.dry_run {
            DispatchReport::default()
        } else {
            deliver(
                &self.database,
                &self.policy,
                self.sender.as_ref(),
                &settings.notifications,
                eligible.clone(),
                options.now,
            )
            .await
        };

        info!(
            "Stale check for {}: {} evaluated, {} stale, {} transitions, {} deferred, {} sent, {} failed",
            organization,
            evaluation.updated.len(),
            stale,
            transitions.len(),
            deferred.len(),
            notifications.sent.len(),
            notifications.failures.len()
        );

        Ok(PassOutcome::Completed(PassReport {
            organization: organization.to_string(),
            threshold_days: threshold.days(),
            evaluated: evaluation.updated.len(),
            stale,
            transitions,
            deferred: deferred.len(),
            eligible,
            notifications,
            dry_run: options.dry_run,
        }))
    }

    /// Runs one pass per known organization, concurrently.
    pub async fn run_all(&self) -> Result<Vec<PassOutcome>, PrequelError> {
        let organizations = self.database.organizations().await?;
        let mut passes = JoinSet::new();

        for organization in organizations {
            let service = self.clone();
            passes.spawn(async move {
                let result = service.run_pass(&organization).await;
                (organization, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => outcomes.push(outcome),
                Ok((organization, Err(e))) => {
                    error!("Stale check for {} failed: {}", organization, e)
                }
                Err(e) => error!("Stale check task panicked: {}", e),
            }
        }
        Ok(outcomes)
    }

    /// Spawns the periodic checker. The first tick fires immediately.
    pub fn spawn_periodic(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                info!("Running scheduled stale PR check");
                if let Err(e) = self.run_all().await {
                    error!("Scheduled stale PR check failed: {}", e);
                }
            }
        })
    }
}
