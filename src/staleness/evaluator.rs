use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::database::models::{PrState, PullRequest};
use crate::staleness::threshold::StalenessThreshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Stale,
}

impl Staleness {
    pub fn from_flag(is_stale: bool) -> Self {
        if is_stale {
            Staleness::Stale
        } else {
            Staleness::Fresh
        }
    }
}

/// A change in a pull request's stale/fresh classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessTransition {
    pub pull_request_id: i64,
    pub from: Staleness,
    pub to: Staleness,
    pub at: DateTime<Utc>,
}

impl StalenessTransition {
    pub fn became_stale(&self) -> bool {
        self.from == Staleness::Fresh && self.to == Staleness::Stale
    }
}

/// Result of one evaluation pass over an organization's pull requests.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub organization: String,
    pub updated: Vec<PullRequest>,
    pub transitions: Vec<StalenessTransition>,
}

impl Evaluation {
    /// Pull requests whose classification changed during the pass.
    pub fn changed(&self) -> impl Iterator<Item = &PullRequest> {
        self.updated.iter().filter(move |pr| {
            self.transitions
                .iter()
                .any(|t| t.pull_request_id == pr.id)
        })
    }

    pub fn stale_count(&self) -> usize {
        self.updated.iter().filter(|pr| pr.is_stale).count()
    }
}

pub fn is_stale(pr: &PullRequest, threshold: StalenessThreshold, now: DateTime<Utc>) -> bool {
    pr.state.is_open() && now - pr.last_activity_at >= threshold.duration()
}

/// Recomputes `is_stale` in place, returning the transition if the classification changed.
pub fn evaluate_pull_request(
    pr: &mut PullRequest,
    threshold: StalenessThreshold,
    now: DateTime<Utc>,
) -> Option<StalenessTransition> {
    let previous = pr.is_stale;
    let current = is_stale(pr, threshold, now);

    if previous == current {
        return None;
    }

    pr.is_stale = current;
    debug!(
        "PR {} (#{}) is now {}",
        pr.id,
        pr.number,
        if current { "stale" } else { "fresh" }
    );

    Some(StalenessTransition {
        pull_request_id: pr.id,
        from: Staleness::from_flag(previous),
        to: Staleness::from_flag(current),
        at: now,
    })
}

/// Evaluates every pull request of an organization against one threshold.
///
/// Each PR is computed independently, so a caller may stop consuming the result
/// at any point without leaving partially applied state behind.
pub fn evaluate(
    organization: &str,
    prs: Vec<PullRequest>,
    threshold: StalenessThreshold,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut updated = Vec::with_capacity(prs.len());
    let mut transitions = Vec::new();

    for mut pr in prs {
        if let Some(transition) = evaluate_pull_request(&mut pr, threshold, now) {
            transitions.push(transition);
        }
        updated.push(pr);
    }

    info!(
        "Evaluated {} pull requests for {} ({} days): {} transitions",
        updated.len(),
        organization,
        threshold.days(),
        transitions.len()
    );

    Evaluation {
        organization: organization.to_string(),
        updated,
        transitions,
    }
}

/// Advances `last_activity_at`. Older timestamps are ignored and the value never
/// drops below `created_at`. Staleness is left for the next evaluation to settle.
pub fn record_activity(pr: &mut PullRequest, at: DateTime<Utc>) -> bool {
    let at = at.max(pr.created_at);
    if at > pr.last_activity_at {
        pr.last_activity_at = at;
        pr.updated_at = pr.updated_at.max(at);
        true
    } else {
        false
    }
}

/// Moves a pull request to `new_state`.
///
/// Closing or merging freezes `is_stale` at false and reports a stale to fresh
/// transition when the PR was stale. Reopening restarts the activity clock at `at`.
pub fn apply_state_change(
    pr: &mut PullRequest,
    new_state: PrState,
    at: DateTime<Utc>,
) -> Option<StalenessTransition> {
    if pr.state == new_state {
        return None;
    }

    let previous = pr.state;
    pr.state = new_state;

    match (previous, new_state) {
        (PrState::Open, _) => {
            pr.closed_at = Some(pr.closed_at.unwrap_or(at));
            if new_state == PrState::Merged {
                pr.merged_at = Some(pr.merged_at.unwrap_or(at));
            }
            let was_stale = pr.is_stale;
            pr.is_stale = false;
            was_stale.then(|| StalenessTransition {
                pull_request_id: pr.id,
                from: Staleness::Stale,
                to: Staleness::Fresh,
                at,
            })
        }
        (_, PrState::Open) => {
            info!("PR {} (#{}) reopened", pr.id, pr.number);
            pr.closed_at = None;
            pr.merged_at = None;
            pr.is_stale = false;
            pr.last_activity_at = at.max(pr.created_at);
            pr.updated_at = pr.updated_at.max(at);
            None
        }
        _ => {
            if new_state == PrState::Merged {
                pr.merged_at = Some(pr.merged_at.unwrap_or(at));
            }
            pr.is_stale = false;
            None
        }
    }
}
