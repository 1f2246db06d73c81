//! One-off stale PR check for a single organization

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use prequel::app;
use prequel::config::AppConfig;
use prequel::database::Database;
use prequel::github::GitHubClient;
use prequel::notifications::{NotificationPolicy, SlackNotifier};
use prequel::scheduler::{EvaluationLocks, PassOptions, PassOutcome, StaleCheckService};

#[derive(Parser)]
#[command(name = "prequel-stale-check")]
#[command(about = "Evaluate an organization's open pull requests for staleness")]
struct Args {
    /// Organization to check
    #[arg(short, long)]
    org: String,

    /// Override the configured stale threshold (1-30 days)
    #[arg(short, long)]
    days: Option<i64>,

    /// Evaluate and report without writing or notifying
    #[arg(long)]
    dry_run: bool,

    /// Refresh open PRs of these repositories from GitHub first
    #[arg(long, value_delimiter = ',')]
    sync: Vec<String>,

    /// Database URL (defaults to configuration)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prequel=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    let database_url = args.database_url.clone().unwrap_or_else(|| config.database_url.clone());

    let database = Database::new(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    database.run_migrations().await?;

    let settings = app::load_settings(&database, &config).await;

    if !args.sync.is_empty() {
        let token = settings
            .snapshot()
            .and_then(|s| s.github_token.clone())
            .or_else(|| config.github_token.clone());
        let Some(token) = token else {
            bail!("--sync needs a GitHub token in settings or GITHUB_TOKEN");
        };
        let client = GitHubClient::new(&token, &config.github_api_url)?;
        for repo in &args.sync {
            match client.sync_open_pull_requests(&database, &args.org, repo).await {
                Ok(report) => println!(
                    "Synced {}/{}: {} imported, {} updated, {} reopened, {} closed",
                    args.org, repo, report.imported, report.updated, report.reopened, report.closed
                ),
                Err(e) => warn!("Failed to sync {}/{}: {}", args.org, repo, e),
            }
        }
    }

    let service = StaleCheckService::new(
        database,
        settings,
        Arc::new(NotificationPolicy::new()),
        Arc::new(SlackNotifier::new()),
        EvaluationLocks::new(),
    );

    let outcome = service
        .run_pass_with(
            &args.org,
            PassOptions {
                dry_run: args.dry_run,
                threshold_override: args.days,
                ..PassOptions::default()
            },
        )
        .await?;

    match &outcome {
        PassOutcome::Skipped { reason, .. } => {
            println!("Skipped: {:?}", reason);
        }
        PassOutcome::Completed(report) => {
            println!("Organization: {}", report.organization);
            println!("Threshold: {} days", report.threshold_days);
            println!("Evaluated: {}", report.evaluated);
            println!("Stale: {}", report.stale);
            println!("Transitions: {}", report.transitions.len());
            if report.deferred > 0 {
                println!("Deferred (changed during the check): {}", report.deferred);
            }
            if report.dry_run {
                println!("Would notify: {}", report.eligible.len());
            } else {
                println!("Notified: {}", report.notifications.sent.len());
                for failure in &report.notifications.failures {
                    println!("  failed {}: {}", failure.dedupe_key, failure.error);
                }
            }
        }
    }

    info!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
