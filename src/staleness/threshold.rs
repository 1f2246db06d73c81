use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PrequelError;

pub const MIN_STALE_PR_DAYS: u32 = 1;
pub const MAX_STALE_PR_DAYS: u32 = 30;
pub const DEFAULT_STALE_PR_DAYS: u32 = 7;

/// Number of whole 24-hour periods without activity after which an open PR is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct StalenessThreshold {
    days: u32,
}

impl StalenessThreshold {
    /// Builds a threshold, clamping out-of-range values to the nearest bound.
    pub fn new(days: i64) -> Self {
        let clamped = days.clamp(MIN_STALE_PR_DAYS as i64, MAX_STALE_PR_DAYS as i64) as u32;
        if clamped as i64 != days {
            warn!(
                "stalePrDays {} outside [{}, {}], using {}",
                days, MIN_STALE_PR_DAYS, MAX_STALE_PR_DAYS, clamped
            );
        }
        Self { days: clamped }
    }

    /// Strict constructor for validating user input.
    pub fn try_new(days: i64) -> Result<Self, PrequelError> {
        if days < MIN_STALE_PR_DAYS as i64 || days > MAX_STALE_PR_DAYS as i64 {
            return Err(PrequelError::stale_days_out_of_range(days));
        }
        Ok(Self { days: days as u32 })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn duration(&self) -> Duration {
        Duration::try_days(self.days as i64).unwrap_or_default()
    }
}

impl Default for StalenessThreshold {
    fn default() -> Self {
        Self {
            days: DEFAULT_STALE_PR_DAYS,
        }
    }
}

/// Stored values are clamped rather than rejected, so one bad value never
/// unloads the rest of the settings.
impl From<i64> for StalenessThreshold {
    fn from(days: i64) -> Self {
        Self::new(days)
    }
}

impl From<StalenessThreshold> for u32 {
    fn from(threshold: StalenessThreshold) -> Self {
        threshold.days
    }
}
