use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;

use prequel::app::{self, AppState};
use prequel::settings::{Settings, SettingsStore};

mod common;
use common::*;

#[tokio::test]
async fn test_health_endpoints() {
    let db = setup_test_db().await;
    let base = spawn_app(test_state(
        db,
        Settings::default(),
        Arc::new(RecordingSender::default()),
    ))
    .await;

    for url in [format!("{}/", base), format!("{}/health", base)] {
        let body: Value = reqwest::get(url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }
}

#[tokio::test]
async fn test_configuration_not_loaded() {
    let db = setup_test_db().await;
    let state = AppState::new(
        test_config(),
        db,
        Arc::new(SettingsStore::new()),
        Arc::new(RecordingSender::default()),
    );
    let base = spawn_app(state).await;

    let response = reqwest::get(format!("{}/api/auth/configuration", base))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["configured"], false);

    let outcome: Value = reqwest::Client::new()
        .post(format!("{}/api/stale-check/acme", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["status"], "skipped");
    assert_eq!(outcome["reason"], "not_configured");
}

#[tokio::test]
async fn test_save_configuration_redacts_token_and_persists() {
    let db = setup_test_db().await;
    let base = spawn_app(test_state(
        db.clone(),
        Settings::default(),
        Arc::new(RecordingSender::default()),
    ))
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/save-configuration", base))
        .json(&json!({
            "stalePrDays": 14,
            "enableSlackNotifications": true,
            "webhookUrl": "https://hooks.slack.com/services/T/B/X",
            "githubToken": "ghp_secret",
            "organizationName": "acme"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved["success"], true);
    assert_eq!(saved["configuration"]["stalePrDays"], 14);

    let body: Value = client
        .get(format!("{}/api/auth/configuration", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["configured"], true);
    assert_eq!(body["githubTokenConfigured"], true);
    assert_eq!(body["organizationName"], "acme");
    assert!(!body.to_string().contains("ghp_secret"));

    let stored = db.load_settings().await.unwrap().unwrap();
    assert_eq!(stored.github_token.as_deref(), Some("ghp_secret"));
    assert_eq!(stored.stale_pr_days.days(), 14);
}

#[tokio::test]
async fn test_invalid_configuration_rejected_without_change() {
    let db = setup_test_db().await;
    let base = spawn_app(test_state(
        db,
        slack_settings("https://hooks.slack.com/services/T/B/X", 7),
        Arc::new(RecordingSender::default()),
    ))
    .await;
    let client = reqwest::Client::new();

    for patch in [
        json!({"stalePrDays": 0}),
        json!({"stalePrDays": 31}),
        json!({"stalePrDays": 10, "webhookUrl": ""}),
    ] {
        let response = client
            .post(format!("{}/api/auth/update-configuration", base))
            .json(&patch)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "patch {} should be rejected", patch);
    }

    let body: Value = client
        .get(format!("{}/api/auth/configuration", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["stalePrDays"], 7);
    assert_eq!(body["webhookUrl"], "https://hooks.slack.com/services/T/B/X");
}

#[tokio::test]
async fn test_stale_check_endpoint_and_dashboard() {
    let db = setup_test_db().await;
    seed_open_pr(&db, "acme/api", 1, Duration::days(10)).await;
    seed_open_pr(&db, "acme/api", 2, Duration::days(2)).await;

    let sender = Arc::new(RecordingSender::default());
    let base = spawn_app(test_state(
        db,
        slack_settings("https://hooks.slack.com/services/T/B/X", 7),
        sender.clone(),
    ))
    .await;
    let client = reqwest::Client::new();

    let dry: Value = client
        .post(format!("{}/api/stale-check/acme?dry_run=true", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dry["status"], "completed");
    assert_eq!(dry["dry_run"], true);
    assert_eq!(dry["eligible"].as_array().unwrap().len(), 1);
    assert_eq!(sender.count(), 0);

    let outcome: Value = client
        .post(format!("{}/api/stale-check/acme", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["stale"], 1);
    assert_eq!(outcome["notifications"]["sent"].as_array().unwrap().len(), 1);
    assert_eq!(sender.titles(), vec!["🚨 Stale Pull Request Detected".to_string()]);

    let stale: Value = reqwest::get(format!("{}/api/stale-prs", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stale.as_array().unwrap().len(), 1);
    assert_eq!(stale[0]["number"], 1);
    assert_eq!(stale[0]["repository_name"], "acme/api");

    let metrics: Value = reqwest::get(format!("{}/api/metrics", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["stale_pr_count"], 1);
    assert_eq!(metrics["pr_authors"][0], json!(["octocat", 2]));

    let prs: Value = reqwest::get(format!("{}/api/pull-requests", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prs.as_array().unwrap().len(), 2);

    let repos: Value = reqwest::get(format!("{}/api/repositories", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(repos[0]["stale_pr_count"], 1);

    let contributors: Value = reqwest::get(format!("{}/api/contributors", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(contributors[0]["username"], "octocat");
}

#[tokio::test]
async fn test_seeded_settings_on_first_start() {
    let db = setup_test_db().await;
    let mut config = test_config();
    config.stale_pr_days = 45;
    config.slack_webhook_url = Some("https://hooks.slack.com/services/T/B/X".to_string());

    let store = app::load_settings(&db, &config).await;
    let settings = store.snapshot().unwrap();
    assert_eq!(settings.stale_pr_days.days(), 30);
    assert!(settings.notifications.enable_slack_notifications);

    // Stored settings win over seeds afterwards.
    config.stale_pr_days = 3;
    let reloaded = app::load_settings(&db, &config).await.snapshot().unwrap();
    assert_eq!(reloaded.stale_pr_days.days(), 30);
}

#[tokio::test]
async fn test_out_of_range_stored_threshold_is_clamped() {
    let db = setup_test_db().await;
    sqlx::query("INSERT INTO settings (id, body, updated_at) VALUES (1, ?, ?)")
        .bind(
            json!({
                "stalePrDays": 45,
                "enableSlackNotifications": true,
                "webhookUrl": "https://hooks.slack.com/services/T/B/X"
            })
            .to_string(),
        )
        .bind(chrono::Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

    let store = app::load_settings(&db, &test_config()).await;
    let settings = store.snapshot().expect("settings should load");
    assert_eq!(settings.stale_pr_days.days(), 30);
    assert!(settings.notifications.enable_slack_notifications);
}

#[tokio::test]
async fn test_failed_persist_keeps_previous_configuration() {
    let db = setup_test_db().await;
    let base = spawn_app(test_state(
        db.clone(),
        slack_settings("https://hooks.slack.com/services/T/B/X", 7),
        Arc::new(RecordingSender::default()),
    ))
    .await;
    let client = reqwest::Client::new();

    db.pool().close().await;

    let response = client
        .post(format!("{}/api/auth/save-configuration", base))
        .json(&json!({"stalePrDays": 14, "organizationName": "acme"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = client
        .get(format!("{}/api/auth/configuration", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["stalePrDays"], 7);
    assert!(body["organizationName"].is_null());
}
