pub mod models;
pub mod queries;
pub mod schema;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::PrequelError;
use crate::settings::Settings;
use crate::staleness::StalenessTransition;
use models::{PrState, PullRequest, ReviewState};

pub use queries::Queries;

pub(crate) const PR_COLUMNS: &str = "pr.id, pr.github_id, pr.repository_id, pr.author_id, pr.title, \
     pr.number, pr.state, pr.html_url, pr.created_at, pr.updated_at, pr.closed_at, \
     pr.merged_at, pr.last_activity_at, pr.is_stale";

pub(crate) fn pull_request_from_row(row: &SqliteRow) -> Result<PullRequest, sqlx::Error> {
    let state: String = row.try_get("state")?;
    let state = PrState::from_str(&state).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(PullRequest {
        id: row.try_get("id")?,
        github_id: row.try_get("github_id")?,
        repository_id: row.try_get("repository_id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        number: row.try_get("number")?,
        state,
        html_url: row.try_get("html_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        closed_at: row.try_get("closed_at")?,
        merged_at: row.try_get("merged_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
        is_stale: row.try_get("is_stale")?,
    })
}

/// Organization a repository belongs to, taken from the owner part of `owner/name`.
pub fn organization_of(full_name: &str) -> &str {
    full_name.split('/').next().unwrap_or(full_name)
}

#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub github_id: i64,
    pub repository_id: i64,
    pub author_id: i64,
    pub title: String,
    pub number: i64,
    pub state: PrState,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReviewComment {
    pub github_id: i64,
    pub review_id: Option<i64>,
    pub pull_request_id: i64,
    pub author_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub command_type: Option<String>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Database { pool })
    }

    /// Single-connection in-memory database with the schema applied.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let database = Database { pool };
        database.run_migrations().await?;
        Ok(database)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(schema::INITIAL_SCHEMA)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_repository(
        &self,
        github_id: i64,
        name: &str,
        full_name: &str,
    ) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO repositories (github_id, name, full_name, organization, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (github_id) DO UPDATE SET
                name = excluded.name,
                full_name = excluded.full_name,
                organization = excluded.organization
            RETURNING id
            "#,
        )
        .bind(github_id)
        .bind(name)
        .bind(full_name)
        .bind(organization_of(full_name))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!("Repository {} stored as {}", full_name, id);
        Ok(id)
    }

    pub async fn upsert_user(
        &self,
        github_id: i64,
        username: &str,
        avatar_url: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (github_id, username, avatar_url, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (github_id) DO UPDATE SET
                username = excluded.username,
                avatar_url = excluded.avatar_url
            RETURNING id
            "#,
        )
        .bind(github_id)
        .bind(username)
        .bind(avatar_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_pull_request(&self, id: i64) -> Result<Option<PullRequest>, sqlx::Error> {
        let sql = format!("SELECT {} FROM pull_requests pr WHERE pr.id = ?", PR_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| pull_request_from_row(&row))
            .transpose()
    }

    pub async fn get_pull_request_by_github_id(
        &self,
        github_id: i64,
    ) -> Result<Option<PullRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM pull_requests pr WHERE pr.github_id = ?",
            PR_COLUMNS
        );
        sqlx::query(&sql)
            .bind(github_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| pull_request_from_row(&row))
            .transpose()
    }

    /// Inserts a pull request on first sight. A repeated insert for the same
    /// GitHub id returns the stored row unchanged.
    pub async fn insert_pull_request(
        &self,
        new_pr: &NewPullRequest,
    ) -> Result<PullRequest, sqlx::Error> {
        let last_activity_at = new_pr.updated_at.max(new_pr.created_at);
        let is_open = new_pr.state.is_open();

        sqlx::query(
            r#"
            INSERT INTO pull_requests
                (github_id, repository_id, author_id, title, number, state, html_url,
                 created_at, updated_at, closed_at, merged_at, last_activity_at, is_stale)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT (github_id) DO NOTHING
            "#,
        )
        .bind(new_pr.github_id)
        .bind(new_pr.repository_id)
        .bind(new_pr.author_id)
        .bind(&new_pr.title)
        .bind(new_pr.number)
        .bind(new_pr.state.as_str())
        .bind(&new_pr.html_url)
        .bind(new_pr.created_at)
        .bind(new_pr.updated_at)
        .bind(if is_open { None } else { new_pr.closed_at })
        .bind(new_pr.merged_at)
        .bind(last_activity_at)
        .execute(&self.pool)
        .await?;

        self.get_pull_request_by_github_id(new_pr.github_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Writes back the mutable columns of a pull request after a webhook.
    ///
    /// `is_stale` belongs to the stale checker: this write can only clear it, when
    /// the pull request leaves `open`, and never raises it.
    pub async fn save_pull_request(&self, pr: &PullRequest) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE pull_requests SET
                title = ?, state = ?, html_url = ?, updated_at = ?, closed_at = ?,
                merged_at = ?, last_activity_at = ?,
                is_stale = CASE WHEN ? = 'open' THEN is_stale ELSE 0 END
            WHERE id = ?
            "#,
        )
        .bind(&pr.title)
        .bind(pr.state.as_str())
        .bind(&pr.html_url)
        .bind(pr.updated_at)
        .bind(pr.closed_at)
        .bind(pr.merged_at)
        .bind(pr.last_activity_at)
        .bind(pr.state.as_str())
        .bind(pr.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores a newer activity time. Leaves `is_stale` for the next pass to settle.
    pub async fn save_activity(&self, pr: &PullRequest) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pull_requests SET last_activity_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(pr.last_activity_at)
        .bind(pr.updated_at)
        .bind(pr.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Compare-and-set of the stale flag computed by a pass.
    ///
    /// The write only lands if the row still has the state, activity time and flag
    /// the pass read. Returns `false` when a webhook changed the row in between; the
    /// next pass evaluates the new values.
    pub async fn save_staleness(
        &self,
        pr: &PullRequest,
        previous: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE pull_requests SET is_stale = ?
            WHERE id = ? AND state = ? AND last_activity_at = ? AND is_stale = ?
                AND (? = 0 OR state = 'open')
            "#,
        )
        .bind(pr.is_stale)
        .bind(pr.id)
        .bind(pr.state.as_str())
        .bind(pr.last_activity_at)
        .bind(previous)
        .bind(pr.is_stale)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!("PR {} changed since it was read, staleness not written", pr.id);
        }
        Ok(applied)
    }

    /// Open pull requests of a repository.
    pub async fn open_pull_requests_for_repository(
        &self,
        repository_id: i64,
    ) -> Result<Vec<PullRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM pull_requests pr WHERE pr.repository_id = ? AND pr.state = 'open' ORDER BY pr.id",
            PR_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(repository_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(pull_request_from_row).collect()
    }

    /// Open pull requests of an organization, plus any non-open PR still flagged
    /// stale so the next pass can clear it.
    pub async fn open_pull_requests_for_org(
        &self,
        organization: &str,
    ) -> Result<Vec<PullRequest>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM pull_requests pr
            JOIN repositories r ON r.id = pr.repository_id
            WHERE r.organization = ? AND (pr.state = 'open' OR pr.is_stale = 1)
            ORDER BY pr.id
            "#,
            PR_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(organization)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(pull_request_from_row).collect()
    }

    pub async fn organizations(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT organization FROM repositories ORDER BY organization",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// `owner/name` of tracked repositories, optionally limited to one organization.
    pub async fn repository_names(
        &self,
        organization: Option<&str>,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT full_name FROM repositories WHERE ? IS NULL OR organization = ? ORDER BY full_name",
        )
        .bind(organization)
        .bind(organization)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn upsert_review(
        &self,
        github_id: i64,
        pull_request_id: i64,
        reviewer_id: i64,
        state: ReviewState,
        submitted_at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO pr_reviews (github_id, pull_request_id, reviewer_id, state, submitted_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (github_id) DO UPDATE SET state = excluded.state
            RETURNING id
            "#,
        )
        .bind(github_id)
        .bind(pull_request_id)
        .bind(reviewer_id)
        .bind(state.as_str())
        .bind(submitted_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn upsert_review_comment(
        &self,
        comment: &NewReviewComment,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO review_comments
                (github_id, review_id, pull_request_id, author_id, body, created_at,
                 updated_at, contains_command, command_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (github_id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at,
                contains_command = excluded.contains_command,
                command_type = excluded.command_type
            RETURNING id
            "#,
        )
        .bind(comment.github_id)
        .bind(comment.review_id)
        .bind(comment.pull_request_id)
        .bind(comment.author_id)
        .bind(&comment.body)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .bind(comment.command_type.is_some())
        .bind(&comment.command_type)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn record_stale_transition(
        &self,
        transition: &StalenessTransition,
    ) -> Result<(), sqlx::Error> {
        if transition.became_stale() {
            sqlx::query(
                "INSERT INTO stale_pr_history (pull_request_id, marked_stale_at) VALUES (?, ?)",
            )
            .bind(transition.pull_request_id)
            .bind(transition.at)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE stale_pr_history SET marked_active_at = ?
                WHERE pull_request_id = ? AND marked_active_at IS NULL
                "#,
            )
            .bind(transition.at)
            .bind(transition.pull_request_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn mark_stale_notification_sent(
        &self,
        pull_request_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE stale_pr_history SET notification_sent = 1
            WHERE id = (SELECT MAX(id) FROM stale_pr_history WHERE pull_request_id = ?)
            "#,
        )
        .bind(pull_request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_settings(&self) -> Result<Option<Settings>, PrequelError> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), PrequelError> {
        let body = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO settings (id, body, updated_at) VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!("Settings persisted");
        Ok(())
    }
}
