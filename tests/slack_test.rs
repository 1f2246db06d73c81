use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prequel::notifications::{
    ChannelError, NotificationEvent, NotificationKind, NotificationMessage, NotificationPolicy,
    NotificationSender, SlackNotifier,
};
use prequel::notifications::message::MessageAction;
use prequel::scheduler::{EvaluationLocks, PassOutcome, StaleCheckService};
use prequel::settings::SettingsStore;

mod common;
use common::*;

fn sample_event() -> NotificationEvent {
    let at = Utc::now();
    NotificationEvent {
        kind: NotificationKind::PrStale,
        pull_request_id: 1,
        occurred_at: at,
        dedupe_key: NotificationEvent::dedupe_key_for(NotificationKind::PrStale, 1, at, None),
        actor: None,
    }
}

fn sample_message() -> NotificationMessage {
    NotificationMessage {
        title: "🚨 Stale Pull Request Detected".to_string(),
        text: "*acme/api #1*: Change".to_string(),
        fields: vec!["*Created by:* octocat".to_string()],
        actions: vec![MessageAction {
            text: "View #1".to_string(),
            url: "https://github.com/acme/api/pull/1".to_string(),
        }],
    }
}

#[tokio::test]
async fn test_slack_posts_block_kit_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let settings = slack_settings(&format!("{}/services/hook", server.uri()), 7);
    SlackNotifier::new()
        .send(&settings.notifications, &sample_event(), &sample_message())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let blocks = body["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["type"], "header");
    assert_eq!(blocks[0]["text"]["text"], "🚨 Stale Pull Request Detected");
    assert_eq!(blocks[1]["type"], "section");
    assert_eq!(blocks[1]["text"]["type"], "mrkdwn");
    assert_eq!(blocks[2]["fields"][0]["text"], "*Created by:* octocat");
    assert_eq!(blocks[3]["type"], "actions");
    assert_eq!(
        blocks[3]["elements"][0]["url"],
        "https://github.com/acme/api/pull/1"
    );
}

#[tokio::test]
async fn test_slack_error_status_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("invalid_payload"))
        .mount(&server)
        .await;

    let settings = slack_settings(&server.uri(), 7);
    let err = SlackNotifier::new()
        .send(&settings.notifications, &sample_event(), &sample_message())
        .await
        .unwrap_err();

    match err {
        ChannelError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "invalid_payload");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_stale_pass_delivers_to_slack_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_test_db().await;
    seed_open_pr(&db, "acme/api", 1, Duration::days(9)).await;
    seed_open_pr(&db, "acme/api", 2, Duration::days(1)).await;

    let settings = Arc::new(SettingsStore::with_settings(slack_settings(
        &format!("{}/hook", server.uri()),
        7,
    )));
    let service = StaleCheckService::new(
        db.clone(),
        settings,
        Arc::new(NotificationPolicy::new()),
        Arc::new(SlackNotifier::new()),
        EvaluationLocks::new(),
    );

    for _ in 0..2 {
        match service.run_pass("acme").await.unwrap() {
            PassOutcome::Completed(report) => assert!(report.notifications.failures.is_empty()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["blocks"][0]["text"]["text"], "🚨 Stale Pull Request Detected");
    assert!(body["blocks"][1]["text"]["text"]
        .as_str()
        .unwrap()
        .contains("No activity for 9 days"));
}

#[tokio::test]
async fn test_unreachable_webhook_reported_as_failure() {
    let db = setup_test_db().await;
    seed_open_pr(&db, "acme/api", 1, Duration::days(9)).await;

    let settings = Arc::new(SettingsStore::with_settings(slack_settings(
        "http://127.0.0.1:9/hook",
        7,
    )));
    let service = StaleCheckService::new(
        db,
        settings,
        Arc::new(NotificationPolicy::new()),
        Arc::new(SlackNotifier::new()),
        EvaluationLocks::new(),
    );

    match service.run_pass("acme").await.unwrap() {
        PassOutcome::Completed(report) => {
            assert_eq!(report.stale, 1);
            assert!(report.notifications.sent.is_empty());
            assert_eq!(report.notifications.failures.len(), 1);
            assert_eq!(report.notifications.failures[0].kind, NotificationKind::PrStale);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
