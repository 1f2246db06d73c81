use thiserror::Error;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Webhook rejected notification with status {status}: {body}")]
    Status { status: u16, body: String },
}
