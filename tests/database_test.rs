use chrono::{Duration, Utc};

use prequel::database::models::{PrState, ReviewState};
use prequel::database::{Database, NewReviewComment, Queries};
use prequel::settings::Settings;
use prequel::staleness::{self, StalenessThreshold};

mod common;
use common::*;

#[tokio::test]
async fn test_database_creation_and_migration() {
    let db = setup_test_db().await;
    assert!(!db.pool().is_closed());

    // Applying the schema twice is harmless.
    db.run_migrations().await.unwrap();
    assert!(db.organizations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pull_request_insert_is_idempotent() {
    let db = setup_test_db().await;
    let id = seed_open_pr(&db, "acme/api", 1, Duration::days(3)).await;
    let again = seed_open_pr(&db, "acme/api", 1, Duration::days(1)).await;
    assert_eq!(id, again);

    let pr = db.get_pull_request(id).await.unwrap().unwrap();
    assert_eq!(pr.state, PrState::Open);
    assert_eq!(pr.last_activity_at, pr.created_at);
    assert!(!pr.is_stale);
}

#[tokio::test]
async fn test_open_pull_requests_scoped_to_organization() {
    let db = setup_test_db().await;
    let acme = seed_open_pr(&db, "acme/api", 1, Duration::days(3)).await;
    let closed = seed_open_pr(&db, "acme/web", 2, Duration::days(3)).await;
    seed_open_pr(&db, "globex/app", 3, Duration::days(3)).await;

    let mut pr = db.get_pull_request(closed).await.unwrap().unwrap();
    staleness::apply_state_change(&mut pr, PrState::Merged, Utc::now());
    db.save_pull_request(&pr).await.unwrap();

    let open = db.open_pull_requests_for_org("acme").await.unwrap();
    assert_eq!(open.iter().map(|p| p.id).collect::<Vec<_>>(), vec![acme]);

    let orgs = db.organizations().await.unwrap();
    assert_eq!(orgs, vec!["acme".to_string(), "globex".to_string()]);
}

#[tokio::test]
async fn test_staleness_round_trip_and_history() {
    let db = setup_test_db().await;
    let id = seed_open_pr(&db, "acme/api", 1, Duration::days(10)).await;
    let prs = db.open_pull_requests_for_org("acme").await.unwrap();

    let evaluation = staleness::evaluate("acme", prs, StalenessThreshold::new(7), Utc::now());
    assert_eq!(evaluation.transitions.len(), 1);

    for pr in evaluation.changed() {
        assert!(db.save_staleness(pr, false).await.unwrap());
    }
    db.record_stale_transition(&evaluation.transitions[0])
        .await
        .unwrap();
    db.mark_stale_notification_sent(id).await.unwrap();

    assert!(db.get_pull_request(id).await.unwrap().unwrap().is_stale);
    let history = Queries::stale_history(db.pool(), id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].notification_sent);
    assert!(history[0].marked_active_at.is_none());

    let stale = Queries::get_stale_prs(db.pool()).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].repository_name, "acme/api");
    assert_eq!(stale[0].author_name, "octocat");
}

#[tokio::test]
async fn test_stale_prs_ordered_by_inactivity() {
    let db = setup_test_db().await;
    let older = seed_open_pr(&db, "acme/api", 1, Duration::days(20)).await;
    let newer = seed_open_pr(&db, "acme/api", 2, Duration::days(9)).await;

    let prs = db.open_pull_requests_for_org("acme").await.unwrap();
    let evaluation = staleness::evaluate("acme", prs, StalenessThreshold::new(7), Utc::now());
    for pr in evaluation.changed() {
        assert!(db.save_staleness(pr, false).await.unwrap());
    }

    let stale: Vec<i64> = Queries::get_stale_prs(db.pool())
        .await
        .unwrap()
        .iter()
        .map(|s| s.pull_request.id)
        .collect();
    assert_eq!(stale, vec![older, newer]);

    let listed: Vec<i64> = Queries::list_pull_requests(db.pool())
        .await
        .unwrap()
        .iter()
        .map(|s| s.pull_request.id)
        .collect();
    assert_eq!(listed, vec![newer, older]);
}

#[tokio::test]
async fn test_repository_and_contributor_stats() {
    let db = setup_test_db().await;
    let pr = seed_open_pr(&db, "acme/api", 1, Duration::days(2)).await;
    seed_open_pr(&db, "acme/web", 2, Duration::days(2)).await;

    let reviewer = db.upsert_user(77, "reviewer", "").await.unwrap();
    let review = db
        .upsert_review(1, pr, reviewer, ReviewState::Approved, Utc::now())
        .await
        .unwrap();
    db.upsert_review_comment(&NewReviewComment {
        github_id: 5,
        review_id: Some(review),
        pull_request_id: pr,
        author_id: reviewer,
        body: "LGTM".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        command_type: Some("LGTM".to_string()),
    })
    .await
    .unwrap();

    let repos = Queries::repositories_with_stats(db.pool()).await.unwrap();
    let api = repos.iter().find(|r| r.full_name == "acme/api").unwrap();
    assert_eq!(api.pr_count, 1);
    assert_eq!(api.review_count, 1);
    assert_eq!(api.contributor_count, 1);
    assert_eq!(api.stale_pr_count, 0);

    let contributors = Queries::contributors_with_stats(db.pool()).await.unwrap();
    let author = contributors.iter().find(|c| c.username == "octocat").unwrap();
    assert_eq!(author.pr_count, 2);
    assert_eq!(author.repositories, vec!["acme/api".to_string(), "acme/web".to_string()]);

    let metrics = Queries::get_pr_metrics(db.pool()).await.unwrap();
    assert_eq!(metrics.pr_authors, vec![("octocat".to_string(), 2)]);
    assert_eq!(metrics.command_users, vec![("reviewer".to_string(), 1)]);
    assert_eq!(metrics.stale_pr_count, 0);
}

#[tokio::test]
async fn test_settings_persist_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("prequel.db").display());

    let settings = slack_settings("https://hooks.slack.com/services/T/B/X", 12);
    {
        let db = Database::new(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        assert!(db.load_settings().await.unwrap().is_none());
        db.save_settings(&settings).await.unwrap();
    }

    let db = Database::new(&url).await.unwrap();
    let loaded: Settings = db.load_settings().await.unwrap().unwrap();
    assert_eq!(loaded, settings);
    assert_eq!(loaded.stale_pr_days.days(), 12);
}

#[tokio::test]
async fn test_staleness_write_skips_rows_changed_since_read() {
    let db = setup_test_db().await;
    let commented = seed_open_pr(&db, "acme/api", 1, Duration::days(10)).await;
    let closed = seed_open_pr(&db, "acme/api", 2, Duration::days(10)).await;
    let untouched = seed_open_pr(&db, "acme/api", 3, Duration::days(10)).await;

    let prs = db.open_pull_requests_for_org("acme").await.unwrap();
    let evaluation = staleness::evaluate("acme", prs, StalenessThreshold::new(7), Utc::now());

    let mut pr = db.get_pull_request(commented).await.unwrap().unwrap();
    staleness::record_activity(&mut pr, Utc::now());
    db.save_activity(&pr).await.unwrap();

    let mut pr = db.get_pull_request(closed).await.unwrap().unwrap();
    staleness::apply_state_change(&mut pr, PrState::Closed, Utc::now());
    db.save_pull_request(&pr).await.unwrap();

    let written: Vec<(i64, bool)> = {
        let mut written = Vec::new();
        for pr in evaluation.changed() {
            written.push((pr.id, db.save_staleness(pr, false).await.unwrap()));
        }
        written
    };
    assert_eq!(written, vec![(commented, false), (closed, false), (untouched, true)]);

    assert!(!db.get_pull_request(commented).await.unwrap().unwrap().is_stale);
    let pr = db.get_pull_request(closed).await.unwrap().unwrap();
    assert_eq!(pr.state, PrState::Closed);
    assert!(!pr.is_stale);
    assert!(db.get_pull_request(untouched).await.unwrap().unwrap().is_stale);
}

#[tokio::test]
async fn test_webhook_write_never_raises_stale_flag() {
    let db = setup_test_db().await;
    let id = seed_open_pr(&db, "acme/api", 1, Duration::days(10)).await;

    let mut pr = db.get_pull_request(id).await.unwrap().unwrap();
    pr.is_stale = true;
    pr.title = "Renamed".to_string();
    db.save_pull_request(&pr).await.unwrap();

    let stored = db.get_pull_request(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Renamed");
    assert!(!stored.is_stale);
}

#[tokio::test]
async fn test_repository_lookups() {
    let db = setup_test_db().await;
    let api = seed_open_pr(&db, "acme/api", 1, Duration::days(1)).await;
    seed_open_pr(&db, "acme/web", 1, Duration::days(1)).await;
    seed_open_pr(&db, "other/tool", 1, Duration::days(1)).await;

    assert_eq!(
        db.repository_names(Some("acme")).await.unwrap(),
        vec!["acme/api".to_string(), "acme/web".to_string()]
    );
    assert_eq!(db.repository_names(None).await.unwrap().len(), 3);

    let pr = db.get_pull_request(api).await.unwrap().unwrap();
    let open = db
        .open_pull_requests_for_repository(pr.repository_id)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, api);
}
