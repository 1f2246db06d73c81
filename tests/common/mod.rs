#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use prequel::app::{self, AppState};
use prequel::config::AppConfig;
use prequel::database::models::PrState;
use prequel::database::{Database, NewPullRequest};
use prequel::notifications::{
    ChannelError, NotificationEvent, NotificationMessage, NotificationSender,
};
use prequel::settings::{NotificationConfig, Settings, SettingsStore};
use prequel::staleness::StalenessThreshold;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create test database")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        github_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        github_token: None,
        github_api_url: "https://api.github.com".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        stale_pr_days: 7,
        slack_webhook_url: None,
        stale_check_interval_secs: 86_400,
    }
}

/// Settings with Slack enabled and every notification kind on.
pub fn slack_settings(webhook_url: &str, stale_days: i64) -> Settings {
    Settings {
        stale_pr_days: StalenessThreshold::new(stale_days),
        notifications: NotificationConfig {
            enable_slack_notifications: true,
            webhook_url: Some(webhook_url.to_string()),
            ..NotificationConfig::default()
        },
        ..Settings::default()
    }
}

/// Sender that keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(NotificationEvent, NotificationMessage)>>,
}

impl RecordingSender {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.title.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        _config: &NotificationConfig,
        event: &NotificationEvent,
        message: &NotificationMessage,
    ) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((event.clone(), message.clone()));
        Ok(())
    }
}

pub fn test_state(
    database: Database,
    settings: Settings,
    sender: Arc<dyn NotificationSender>,
) -> AppState {
    AppState::new(
        test_config(),
        database,
        Arc::new(SettingsStore::with_settings(settings)),
        sender,
    )
}

/// Serves the full router on an ephemeral port and returns its base URL.
pub async fn spawn_app(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    let router = app::router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Posts a signed webhook delivery.
pub async fn post_webhook(
    base_url: &str,
    event: &str,
    payload: &serde_json::Value,
) -> reqwest::Response {
    let body = serde_json::to_vec(payload).unwrap();
    reqwest::Client::new()
        .post(format!("{}/webhooks/github", base_url))
        .header("X-GitHub-Event", event)
        .header(
            "X-Hub-Signature-256",
            prequel::github::webhooks::sign(&body, WEBHOOK_SECRET),
        )
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

/// Inserts an open pull request in `full_name` created `age` ago and returns its id.
pub async fn seed_open_pr(database: &Database, full_name: &str, number: i64, age: Duration) -> i64 {
    let created_at = Utc::now() - age;
    seed_pr_at(database, full_name, number, created_at).await
}

pub async fn seed_pr_at(
    database: &Database,
    full_name: &str,
    number: i64,
    created_at: DateTime<Utc>,
) -> i64 {
    let name = full_name.split('/').nth(1).unwrap_or(full_name);
    let repo_id = database
        .upsert_repository(repo_github_id(full_name), name, full_name)
        .await
        .unwrap();
    let author_id = database.upsert_user(42, "octocat", "").await.unwrap();

    database
        .insert_pull_request(&NewPullRequest {
            github_id: repo_github_id(full_name) * 1000 + number,
            repository_id: repo_id,
            author_id,
            title: format!("Change #{}", number),
            number,
            state: PrState::Open,
            html_url: format!("https://github.com/{}/pull/{}", full_name, number),
            created_at,
            updated_at: created_at,
            closed_at: None,
            merged_at: None,
        })
        .await
        .unwrap()
        .id
}

fn repo_github_id(full_name: &str) -> i64 {
    full_name.bytes().map(i64::from).sum()
}

/// Mock GitHub webhook payloads
pub mod github_mocks {
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    pub fn repository(full_name: &str) -> Value {
        let name = full_name.split('/').nth(1).unwrap_or(full_name);
        json!({
            "id": 9000,
            "name": name,
            "full_name": full_name
        })
    }

    pub fn user(id: i64, login: &str) -> Value {
        json!({
            "id": id,
            "login": login,
            "avatar_url": format!("https://avatars.githubusercontent.com/u/{}", id)
        })
    }

    pub fn pull_request(
        pr_id: i64,
        number: i64,
        state: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Value {
        let closed_at = (state == "closed").then(|| updated_at.to_rfc3339());
        json!({
            "id": pr_id,
            "number": number,
            "title": format!("Improve retries #{}", number),
            "body": "Adds exponential backoff.",
            "state": state,
            "html_url": format!("https://github.com/acme/api/pull/{}", number),
            "user": user(1, "author"),
            "created_at": created_at.to_rfc3339(),
            "updated_at": updated_at.to_rfc3339(),
            "closed_at": closed_at,
            "merged_at": null
        })
    }

    pub fn pull_request_event(action: &str, pull_request: Value) -> Value {
        json!({
            "action": action,
            "pull_request": pull_request,
            "repository": repository("acme/api")
        })
    }

    pub fn review_submitted(
        review_id: i64,
        reviewer: &str,
        state: &str,
        body: Option<&str>,
        submitted_at: DateTime<Utc>,
        pull_request: Value,
    ) -> Value {
        json!({
            "action": "submitted",
            "review": {
                "id": review_id,
                "user": user(2, reviewer),
                "body": body,
                "state": state,
                "html_url": "https://github.com/acme/api/pull/1#pullrequestreview-1",
                "submitted_at": submitted_at.to_rfc3339()
            },
            "pull_request": pull_request,
            "repository": repository("acme/api")
        })
    }

    pub fn review_comment_created(
        comment_id: i64,
        commenter: &str,
        body: &str,
        at: DateTime<Utc>,
        pull_request: Value,
    ) -> Value {
        json!({
            "action": "created",
            "comment": {
                "id": comment_id,
                "user": user(3, commenter),
                "body": body,
                "created_at": at.to_rfc3339(),
                "updated_at": at.to_rfc3339(),
                "pull_request_review_id": null
            },
            "pull_request": pull_request,
            "repository": repository("acme/api")
        })
    }
}
