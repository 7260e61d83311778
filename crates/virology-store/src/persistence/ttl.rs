//! Expiry instants applied once a result has been handed out.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use virology_core::config::VirologyConfig;

/// When test data (order and result) and submission data may be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirologyDataTimeToLive {
    pub test_data_expire_at: DateTime<Utc>,
    pub submission_data_expire_at: DateTime<Utc>,
}

/// Pure: `compute(now)` adds the two retention durations to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirologyDataTimeToLiveCalculator {
    test_data_retention: TimeDelta,
    submission_data_retention: TimeDelta,
}

impl VirologyDataTimeToLiveCalculator {
    pub const fn new(test_data_retention: TimeDelta, submission_data_retention: TimeDelta) -> Self {
        Self {
            test_data_retention,
            submission_data_retention,
        }
    }

    /// Four hours for test data, four days for submission data.
    pub fn default_ttl() -> Self {
        Self::new(TimeDelta::hours(4), TimeDelta::days(4))
    }

    pub fn from_config(config: &VirologyConfig) -> Self {
        Self::new(
            secs_to_delta(config.test_data_retention_secs),
            secs_to_delta(config.submission_data_retention_secs),
        )
    }

    pub fn compute(&self, now: DateTime<Utc>) -> VirologyDataTimeToLive {
        VirologyDataTimeToLive {
            test_data_expire_at: add_saturating(now, self.test_data_retention),
            submission_data_expire_at: add_saturating(now, self.submission_data_retention),
        }
    }
}

impl Default for VirologyDataTimeToLiveCalculator {
    fn default() -> Self {
        Self::default_ttl()
    }
}

/// Seconds from configuration as a duration, clamped to what `TimeDelta`
/// can hold.
pub(crate) fn secs_to_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

pub(crate) fn add_saturating(instant: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    instant
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
