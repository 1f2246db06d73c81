pub mod client;
pub mod protection;
pub mod types;
pub mod webhooks;

pub use client::{GitHubClient, SyncReport};
pub use protection::BranchProtectionRules;
pub use webhooks::{verify_signature, WebhookEventType};
