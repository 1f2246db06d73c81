use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

impl From<serde_json::Error> for PrequelError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for PrequelError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for PrequelError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<octocrab::Error> for PrequelError {
    fn from(err: octocrab::Error) -> Self {
        Self::GitHubError(format!("GitHub API error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum PrequelError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("GitHub API error: {0}")]
    GitHubError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Webhook processing error: {0}")]
    WebhookError(String),

}

impl PrequelError {
    pub fn stale_days_out_of_range(days: i64) -> Self {
        Self::ValidationError(format!(
            "stalePrDays must be between 1 and 30, got {}",
            days
        ))
    }

    pub fn missing_webhook_url() -> Self {
        Self::ValidationError(
            "A Slack webhook URL is required when Slack notifications are enabled".to_string(),
        )
    }
}

impl IntoResponse for PrequelError {
    fn into_response(self) -> Response {
        let status = match &self {
            PrequelError::ValidationError(_) | PrequelError::WebhookError(_) => {
                StatusCode::BAD_REQUEST
            }
            PrequelError::GitHubError(_) => StatusCode::BAD_GATEWAY,
            PrequelError::ConfigError(_) | PrequelError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
