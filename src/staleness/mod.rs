//! Stale pull request detection
//!
//! Classifies open pull requests as stale or fresh against the configured
//! inactivity threshold and reports every classification change.

pub mod evaluator;
pub mod threshold;

pub use evaluator::{
    apply_state_change, evaluate, evaluate_pull_request, is_stale, record_activity, Evaluation,
    Staleness, StalenessTransition,
};
pub use threshold::StalenessThreshold;
