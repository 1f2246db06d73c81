use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Checks a `sha256=<hex>` signature header against the raw request body.
///
/// A missing header or an unset secret never verifies.
#[must_use]
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: Option<&str>) -> bool {
    let Some(header) = header else {
        error!("No {} found in headers", SIGNATURE_HEADER);
        return false;
    };
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        error!("GITHUB_WEBHOOK_SECRET not configured");
        return false;
    };

    let Some(hex_signature) = header.strip_prefix("sha256=") else {
        debug!("Signature header has no sha256= prefix");
        return false;
    };
    let Ok(signature) = hex::decode(hex_signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&signature).into()
}

/// Produces the header value GitHub would send for `body`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
    Ping,
    Other(String),
}

impl WebhookEventType {
    pub fn from_header(name: &str) -> Self {
        match name {
            "pull_request" => WebhookEventType::PullRequest,
            "pull_request_review" => WebhookEventType::PullRequestReview,
            "pull_request_review_comment" => WebhookEventType::PullRequestReviewComment,
            "ping" => WebhookEventType::Ping,
            other => WebhookEventType::Other(other.to_string()),
        }
    }
}
