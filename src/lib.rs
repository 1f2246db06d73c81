pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod github;
pub mod notifications;
pub mod scheduler;
pub mod settings;
pub mod staleness;
pub mod webhooks;
pub mod workflows;

pub use error::PrequelError;
