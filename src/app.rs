use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::AppConfig;
use crate::database::Database;
use crate::notifications::{NotificationPolicy, NotificationSender};
use crate::scheduler::{EvaluationLocks, StaleCheckService};
use crate::settings::SettingsStore;
use crate::webhooks;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub settings: Arc<SettingsStore>,
    pub policy: Arc<NotificationPolicy>,
    pub sender: Arc<dyn NotificationSender>,
    pub stale_check: StaleCheckService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        database: Database,
        settings: Arc<SettingsStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        let policy = Arc::new(NotificationPolicy::new());
        let stale_check = StaleCheckService::new(
            database.clone(),
            settings.clone(),
            policy.clone(),
            sender.clone(),
            EvaluationLocks::new(),
        );

        Self {
            config: Arc::new(config),
            database,
            settings,
            policy,
            sender,
            stale_check,
        }
    }
}

/// Loads stored settings, falling back to the configuration's seeds on first start.
///
/// A store read failure leaves the settings unloaded; passes skip until the
/// settings are saved again.
pub async fn load_settings(database: &Database, config: &AppConfig) -> Arc<SettingsStore> {
    match database.load_settings().await {
        Ok(Some(settings)) => {
            info!("Loaded stored settings");
            Arc::new(SettingsStore::with_settings(settings))
        }
        Ok(None) => {
            let seeded = config.seed_settings();
            if let Err(e) = database.save_settings(&seeded).await {
                error!("Failed to persist seeded settings: {}", e);
            }
            info!("No stored settings, seeded from configuration");
            Arc::new(SettingsStore::with_settings(seeded))
        }
        Err(e) => {
            error!("Failed to load settings: {}", e);
            Arc::new(SettingsStore::new())
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(api::health_check).post(webhooks::github::handle_webhook),
        )
        .route("/health", get(api::health_check))
        .route("/webhooks/github", post(webhooks::github::handle_webhook))
        .route("/api/metrics", get(api::get_metrics))
        .route("/api/metrics/workflows", get(api::get_workflow_metrics))
        .route("/api/workflow-runs", get(api::get_workflow_runs))
        .route("/api/repos/branch-protection", post(api::setup_branch_protection))
        .route("/api/stale-prs", get(api::get_stale_prs))
        .route("/api/pull-requests", get(api::get_pull_requests))
        .route("/api/repositories", get(api::get_repositories))
        .route("/api/contributors", get(api::get_contributors))
        .route("/api/auth/configuration", get(api::get_configuration))
        .route("/api/auth/save-configuration", post(api::save_configuration))
        .route("/api/auth/update-configuration", post(api::save_configuration))
        .route(
            "/api/auth/validate-github-token",
            post(api::validate_github_token),
        )
        .route("/api/stale-check/:org", post(api::run_stale_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}
