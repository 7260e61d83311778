//! Clock abstraction.
//!
//! Services take an `Arc<dyn Clock>` so tests can pin "now" to a fixed
//! instant while production code reads the system time.

use chrono::{DateTime, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Seconds since the Unix epoch, the representation used for every `expireAt`
/// attribute.
pub fn epoch_seconds(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

/// Inverse of [`epoch_seconds`]. `None` when the value is outside the range
/// `chrono` can represent.
pub fn from_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_frozen() {
        let instant = from_epoch_seconds(1_606_780_800).unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn epoch_seconds_roundtrip() {
        let instant = from_epoch_seconds(10).unwrap();
        assert_eq!(instant.to_rfc3339(), "1970-01-01T00:00:10+00:00");
        assert_eq!(epoch_seconds(instant), 10);
    }

    #[test]
    fn system_clock_is_reasonable() {
        // Should be after 2024-01-01
        assert!(epoch_seconds(SystemClock.now()) > 1_704_067_200);
    }
}
