use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::database::models::*;
use crate::database::{pull_request_from_row, PR_COLUMNS};

pub struct Queries;

fn summary_from_row(row: &SqliteRow) -> Result<PullRequestSummary, sqlx::Error> {
    Ok(PullRequestSummary {
        pull_request: pull_request_from_row(row)?,
        repository_name: row.try_get("repository_name")?,
        author_name: row.try_get("author_name")?,
    })
}

fn counts_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<(String, i64)>, sqlx::Error> {
    rows.iter()
        .map(|row| {
            let username: String = row.try_get("username")?;
            let total: i64 = row.try_get("total")?;
            Ok::<_, sqlx::Error>((username, total))
        })
        .collect()
}

impl Queries {
    pub async fn get_pull_request_summary(
        pool: &SqlitePool,
        pull_request_id: i64,
    ) -> Result<Option<PullRequestSummary>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}, r.full_name AS repository_name, u.username AS author_name
            FROM pull_requests pr
            JOIN repositories r ON r.id = pr.repository_id
            JOIN users u ON u.id = pr.author_id
            WHERE pr.id = ?
            "#,
            PR_COLUMNS
        );
        sqlx::query(&sql)
            .bind(pull_request_id)
            .fetch_optional(pool)
            .await?
            .map(|row| summary_from_row(&row))
            .transpose()
    }

    /// Open stale pull requests, longest inactive first.
    pub async fn get_stale_prs(pool: &SqlitePool) -> Result<Vec<PullRequestSummary>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}, r.full_name AS repository_name, u.username AS author_name
            FROM pull_requests pr
            JOIN repositories r ON r.id = pr.repository_id
            JOIN users u ON u.id = pr.author_id
            WHERE pr.is_stale = 1 AND pr.state = 'open'
            "#,
            PR_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut stale = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        stale.sort_by_key(|s| s.pull_request.last_activity_at);
        Ok(stale)
    }

    /// Every pull request, most recently created first.
    pub async fn list_pull_requests(
        pool: &SqlitePool,
    ) -> Result<Vec<PullRequestSummary>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}, r.full_name AS repository_name, u.username AS author_name
            FROM pull_requests pr
            JOIN repositories r ON r.id = pr.repository_id
            JOIN users u ON u.id = pr.author_id
            "#,
            PR_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut prs = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        prs.sort_by(|a, b| b.pull_request.created_at.cmp(&a.pull_request.created_at));
        Ok(prs)
    }

    pub async fn get_pr_metrics(pool: &SqlitePool) -> Result<PrMetrics, sqlx::Error> {
        let pr_authors = sqlx::query(
            r#"
            SELECT u.username AS username, COUNT(pr.id) AS total
            FROM users u
            JOIN pull_requests pr ON u.id = pr.author_id
            GROUP BY u.username
            ORDER BY total DESC, u.username
            "#,
        )
        .fetch_all(pool)
        .await?;

        let active_reviewers = sqlx::query(
            r#"
            SELECT u.username AS username, COUNT(rv.id) AS total
            FROM users u
            JOIN pr_reviews rv ON u.id = rv.reviewer_id
            GROUP BY u.username
            ORDER BY total DESC, u.username
            "#,
        )
        .fetch_all(pool)
        .await?;

        let command_users = sqlx::query(
            r#"
            SELECT u.username AS username, COUNT(rc.id) AS total
            FROM users u
            JOIN review_comments rc ON u.id = rc.author_id
            WHERE rc.contains_command = 1
            GROUP BY u.username
            ORDER BY total DESC, u.username
            "#,
        )
        .fetch_all(pool)
        .await?;

        let stale_pr_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(id) FROM pull_requests WHERE is_stale = 1 AND state = 'open'",
        )
        .fetch_one(pool)
        .await?;

        Ok(PrMetrics {
            pr_authors: counts_from_rows(pr_authors)?,
            active_reviewers: counts_from_rows(active_reviewers)?,
            command_users: counts_from_rows(command_users)?,
            stale_pr_count,
        })
    }

    pub async fn repositories_with_stats(
        pool: &SqlitePool,
    ) -> Result<Vec<RepositoryStats>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.github_id, r.name, r.full_name, r.created_at,
                (SELECT COUNT(*) FROM pull_requests p WHERE p.repository_id = r.id) AS pr_count,
                (SELECT COUNT(*) FROM pr_reviews rv
                    JOIN pull_requests p ON p.id = rv.pull_request_id
                    WHERE p.repository_id = r.id) AS review_count,
                (SELECT COUNT(*) FROM pull_requests p
                    WHERE p.repository_id = r.id AND p.is_stale = 1 AND p.state = 'open') AS stale_pr_count,
                (SELECT COUNT(DISTINCT p.author_id) FROM pull_requests p
                    WHERE p.repository_id = r.id) AS contributor_count,
                (SELECT MAX(p.last_activity_at) FROM pull_requests p
                    WHERE p.repository_id = r.id) AS last_activity
            FROM repositories r
            ORDER BY r.full_name
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(RepositoryStats {
                    id: row.try_get("id")?,
                    github_id: row.try_get("github_id")?,
                    name: row.try_get("name")?,
                    full_name: row.try_get("full_name")?,
                    created_at: row.try_get("created_at")?,
                    pr_count: row.try_get("pr_count")?,
                    review_count: row.try_get("review_count")?,
                    stale_pr_count: row.try_get("stale_pr_count")?,
                    contributor_count: row.try_get("contributor_count")?,
                    last_activity: row.try_get("last_activity")?,
                })
            })
            .collect()
    }

    pub async fn contributors_with_stats(
        pool: &SqlitePool,
    ) -> Result<Vec<ContributorStats>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.github_id, u.username, u.avatar_url, u.created_at,
                (SELECT COUNT(*) FROM pull_requests p WHERE p.author_id = u.id) AS pr_count,
                (SELECT COUNT(*) FROM pr_reviews rv WHERE rv.reviewer_id = u.id) AS review_count,
                (SELECT COUNT(*) FROM review_comments c
                    WHERE c.author_id = u.id AND c.contains_command = 1) AS command_count,
                (SELECT GROUP_CONCAT(DISTINCT r.full_name) FROM pull_requests p
                    JOIN repositories r ON r.id = p.repository_id
                    WHERE p.author_id = u.id) AS repositories
            FROM users u
            ORDER BY pr_count DESC, u.username
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| {
                let repositories: Option<String> = row.try_get("repositories")?;
                let mut repositories: Vec<String> = repositories
                    .map(|list| list.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                repositories.sort();

                Ok::<_, sqlx::Error>(ContributorStats {
                    id: row.try_get("id")?,
                    github_id: row.try_get("github_id")?,
                    username: row.try_get("username")?,
                    avatar_url: row.try_get("avatar_url")?,
                    created_at: row.try_get("created_at")?,
                    pr_count: row.try_get("pr_count")?,
                    review_count: row.try_get("review_count")?,
                    command_count: row.try_get("command_count")?,
                    repositories,
                })
            })
            .collect()
    }

    pub async fn stale_history(
        pool: &SqlitePool,
        pull_request_id: i64,
    ) -> Result<Vec<StalePrHistory>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, pull_request_id, marked_stale_at, marked_active_at, notification_sent
            FROM stale_pr_history
            WHERE pull_request_id = ?
            ORDER BY id
            "#,
        )
        .bind(pull_request_id)
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(StalePrHistory {
                    id: row.try_get("id")?,
                    pull_request_id: row.try_get("pull_request_id")?,
                    marked_stale_at: row.try_get("marked_stale_at")?,
                    marked_active_at: row.try_get("marked_active_at")?,
                    notification_sent: row.try_get("notification_sent")?,
                })
            })
            .collect()
    }
}
