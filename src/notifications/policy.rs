//! Notification eligibility
//!
//! Gating order for every domain event:
//! 1. Slack notifications globally disabled: nothing is eligible
//! 2. per-kind toggle off: event dropped
//! 3. `pr_stale`: at most one per pull request per UTC day and per trailing 24 hours
//! 4. `pr_created` / `changes_requested`: at most one per originating event

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::database::models::ReviewState;
use crate::notifications::{DomainEvent, NotificationEvent, NotificationKind};
use crate::settings::NotificationConfig;

fn stale_window() -> Duration {
    Duration::try_hours(24).unwrap_or_default()
}

/// How long event-keyed deliveries (`pr_created`, `changes_requested`) are remembered.
/// GitHub only offers redelivery of recent webhook deliveries, well inside this.
fn event_key_retention() -> Duration {
    Duration::try_days(30).unwrap_or_default()
}

fn within_window(previous: DateTime<Utc>, at: DateTime<Utc>) -> bool {
    (at - previous).abs() < stale_window()
}

/// Successful deliveries, consulted when deciding eligibility.
#[derive(Debug, Default)]
struct DispatchLedger {
    keys: HashMap<String, (NotificationKind, DateTime<Utc>)>,
    last_stale: HashMap<i64, DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
}

impl DispatchLedger {
    fn record(&mut self, event: &NotificationEvent) {
        self.keys
            .entry(event.dedupe_key.clone())
            .or_insert((event.kind, event.occurred_at));

        if event.kind == NotificationKind::PrStale {
            let last = self
                .last_stale
                .entry(event.pull_request_id)
                .or_insert(event.occurred_at);
            *last = (*last).max(event.occurred_at);
        }

        self.latest = Some(
            self.latest
                .map_or(event.occurred_at, |latest| latest.max(event.occurred_at)),
        );
        self.prune();
    }

    fn suppresses(&self, event: &NotificationEvent) -> bool {
        if self.keys.contains_key(&event.dedupe_key) {
            return true;
        }
        event.kind == NotificationKind::PrStale
            && self
                .last_stale
                .get(&event.pull_request_id)
                .map(|previous| within_window(*previous, event.occurred_at))
                .unwrap_or(false)
    }

    /// Drops entries too old to suppress anything near the newest delivery.
    /// Stale entries only matter for a day; event-keyed entries cover redeliveries.
    fn prune(&mut self) {
        let Some(latest) = self.latest else {
            return;
        };
        let stale_horizon = latest - stale_window() * 2;
        let event_horizon = latest - event_key_retention();
        self.keys.retain(|_, (kind, at)| match kind {
            NotificationKind::PrStale => *at >= stale_horizon,
            _ => *at >= event_horizon,
        });
        self.last_stale.retain(|_, at| *at >= stale_horizon);
    }
}

pub struct NotificationPolicy {
    ledger: Mutex<DispatchLedger>,
}

impl NotificationPolicy {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(DispatchLedger::default()),
        }
    }

    /// Lazily yields the notifications eligible for dispatch in one batch.
    ///
    /// The returned iterator is finite and single-use. Dedup within the batch is
    /// tracked by the iterator itself; dedup across batches relies on
    /// [`record_dispatched`](Self::record_dispatched).
    pub fn decide<'a, I>(
        &'a self,
        events: I,
        config: &'a NotificationConfig,
    ) -> Decisions<'a, I::IntoIter>
    where
        I: IntoIterator<Item = DomainEvent>,
    {
        Decisions {
            policy: self,
            config,
            events: events.into_iter(),
            batch_keys: HashSet::new(),
            batch_stale: HashMap::new(),
        }
    }

    /// Marks a notification as delivered. Recording the same key again is a no-op,
    /// so callers may retry deliveries freely.
    pub fn record_dispatched(&self, event: &NotificationEvent) {
        let mut ledger = self
            .ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ledger.record(event);
    }

    pub fn was_dispatched(&self, dedupe_key: &str) -> bool {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys
            .contains_key(dedupe_key)
    }

    fn suppressed_by_ledger(&self, event: &NotificationEvent) -> bool {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .suppresses(event)
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`NotificationPolicy::decide`].
pub struct Decisions<'a, I> {
    policy: &'a NotificationPolicy,
    config: &'a NotificationConfig,
    events: I,
    batch_keys: HashSet<String>,
    batch_stale: HashMap<i64, DateTime<Utc>>,
}

impl<'a, I> Decisions<'a, I> {
    fn candidate(event: DomainEvent) -> Option<NotificationEvent> {
        match event {
            DomainEvent::PrCreated {
                event_id,
                pull_request_id,
                occurred_at,
            } => Some(NotificationEvent {
                kind: NotificationKind::PrCreated,
                pull_request_id,
                occurred_at,
                dedupe_key: NotificationEvent::dedupe_key_for(
                    NotificationKind::PrCreated,
                    pull_request_id,
                    occurred_at,
                    Some(&event_id),
                ),
                actor: None,
            }),
            DomainEvent::ReviewStateChanged {
                event_id,
                pull_request_id,
                state,
                reviewer,
                occurred_at,
            } => match state {
                ReviewState::ChangesRequested => Some(NotificationEvent {
                    kind: NotificationKind::ChangesRequested,
                    pull_request_id,
                    occurred_at,
                    dedupe_key: NotificationEvent::dedupe_key_for(
                        NotificationKind::ChangesRequested,
                        pull_request_id,
                        occurred_at,
                        Some(&event_id),
                    ),
                    actor: reviewer,
                }),
                ReviewState::Unknown => {
                    warn!(
                        "Skipping review event {} on PR {} with unknown state",
                        event_id, pull_request_id
                    );
                    None
                }
                _ => None,
            },
            DomainEvent::StalenessTransition(transition) => {
                transition.became_stale().then(|| NotificationEvent {
                    kind: NotificationKind::PrStale,
                    pull_request_id: transition.pull_request_id,
                    occurred_at: transition.at,
                    dedupe_key: NotificationEvent::dedupe_key_for(
                        NotificationKind::PrStale,
                        transition.pull_request_id,
                        transition.at,
                        None,
                    ),
                    actor: None,
                })
            }
            DomainEvent::Unknown { kind } => {
                warn!("Skipping event of unknown kind: {}", kind);
                None
            }
        }
    }

    fn is_batch_duplicate(&self, event: &NotificationEvent) -> bool {
        if self.batch_keys.contains(&event.dedupe_key) {
            return true;
        }
        event.kind == NotificationKind::PrStale
            && self
                .batch_stale
                .get(&event.pull_request_id)
                .map(|previous| within_window(*previous, event.occurred_at))
                .unwrap_or(false)
    }
}

impl<'a, I> Iterator for Decisions<'a, I>
where
    I: Iterator<Item = DomainEvent>,
{
    type Item = NotificationEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.config.enable_slack_notifications {
            return None;
        }

        while let Some(event) = self.events.next() {
            let Some(candidate) = Self::candidate(event) else {
                continue;
            };

            if !self.config.allows(candidate.kind) {
                debug!("{} notifications disabled, dropping {}", candidate.kind, candidate.dedupe_key);
                continue;
            }

            if self.is_batch_duplicate(&candidate) || self.policy.suppressed_by_ledger(&candidate) {
                debug!("Suppressing duplicate notification {}", candidate.dedupe_key);
                continue;
            }

            self.batch_keys.insert(candidate.dedupe_key.clone());
            if candidate.kind == NotificationKind::PrStale {
                self.batch_stale
                    .insert(candidate.pull_request_id, candidate.occurred_at);
            }
            return Some(candidate);
        }

        None
    }
}
