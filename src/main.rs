use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prequel::app::{self, AppState};
use prequel::config::AppConfig;
use prequel::database::Database;
use prequel::notifications::SlackNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prequel=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prequel");

    let config = AppConfig::load()?;
    info!("Configuration loaded");
    info!(
        "GITHUB_WEBHOOK_SECRET configured: {}",
        if config.github_webhook_secret.is_some() { "Yes" } else { "No" }
    );

    let database = Database::new(&config.database_url).await?;
    info!("Database connected");

    database.run_migrations().await?;
    info!("Database migrations completed");

    let settings = app::load_settings(&database, &config).await;
    let interval = Duration::from_secs(config.stale_check_interval_secs.max(60));
    let addr = config.bind_address();

    let state = AppState::new(config, database, settings, Arc::new(SlackNotifier::new()));

    // Stale PR checker
    state.stale_check.clone().spawn_periodic(interval);
    info!("Stale PR checker started (every {}s)", interval.as_secs());

    let app = app::router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
