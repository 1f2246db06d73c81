use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::database::{Database, Queries};
use crate::notifications::message::render;
use crate::notifications::{NotificationEvent, NotificationKind, NotificationPolicy, NotificationSender};
use crate::settings::NotificationConfig;

/// A notification the sender could not deliver. The policy does not retry; the
/// caller may resubmit with the same dedupe key.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryFailure {
    pub dedupe_key: String,
    pub kind: NotificationKind,
    pub pull_request_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub sent: Vec<NotificationEvent>,
    pub failures: Vec<DeliveryFailure>,
}

/// Renders and sends each eligible notification, recording the ones that succeed.
pub async fn deliver<I>(
    database: &Database,
    policy: &NotificationPolicy,
    sender: &dyn NotificationSender,
    config: &NotificationConfig,
    eligible: I,
    now: DateTime<Utc>,
) -> DispatchReport
where
    I: IntoIterator<Item = NotificationEvent>,
{
    let mut report = DispatchReport::default();

    for event in eligible {
        let summary = match Queries::get_pull_request_summary(database.pool(), event.pull_request_id).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                report.failures.push(failure(&event, "pull request not found".to_string()));
                continue;
            }
            Err(e) => {
                report.failures.push(failure(&event, e.to_string()));
                continue;
            }
        };

        let message = render(&event, &summary, now);

        match sender.send(config, &event, &message).await {
            Ok(()) => {
                policy.record_dispatched(&event);
                if event.kind == NotificationKind::PrStale {
                    if let Err(e) = database.mark_stale_notification_sent(event.pull_request_id).await {
                        warn!("Failed to mark stale notification for PR {}: {}", event.pull_request_id, e);
                    }
                }
                info!("Sent {} via {} for PR {}", event.kind, sender.name(), event.pull_request_id);
                report.sent.push(event);
            }
            Err(e) => {
                warn!("Delivery of {} via {} failed: {}", event.dedupe_key, sender.name(), e);
                report.failures.push(failure(&event, e.to_string()));
            }
        }
    }

    report
}

fn failure(event: &NotificationEvent, error: String) -> DeliveryFailure {
    DeliveryFailure {
        dedupe_key: event.dedupe_key.clone(),
        kind: event.kind,
        pull_request_id: event.pull_request_id,
        error,
    }
}
