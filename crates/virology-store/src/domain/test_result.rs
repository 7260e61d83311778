//! Test kits, outcomes and the pending/available result union.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ParseError;
use super::tokens::TestResultPollingToken;

/// Kind of test that produced a result. Persisted by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestKit {
    LabResult,
    RapidResult,
    RapidSelfReported,
}

impl TestKit {
    pub const ALL: [Self; 3] = [Self::LabResult, Self::RapidResult, Self::RapidSelfReported];

    /// Assumed for records written before the `testKit` field existed.
    pub const LEGACY_DEFAULT: Self = Self::LabResult;

    pub const fn name(self) -> &'static str {
        match self {
            Self::LabResult => "LAB_RESULT",
            Self::RapidResult => "RAPID_RESULT",
            Self::RapidSelfReported => "RAPID_SELF_REPORTED",
        }
    }
}

impl fmt::Display for TestKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestKit {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kit| kit.name() == s)
            .ok_or_else(|| ParseError::new("test kit", s))
    }
}

/// Outcome of a finished test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestResult {
    Positive,
    Negative,
    Void,
}

impl TestResult {
    /// Value stored in the `testResult` field.
    pub const fn wire_value(self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Void => "VOID",
        }
    }

    pub fn from_wire(value: &str) -> Result<Self, ParseError> {
        match value {
            "POSITIVE" => Ok(Self::Positive),
            "NEGATIVE" => Ok(Self::Negative),
            "VOID" => Ok(Self::Void),
            other => Err(ParseError::new("test result", other)),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_value())
    }
}

/// The `status` field of a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResultAvailability {
    Pending,
    Available,
}

impl TestResultAvailability {
    pub const fn text(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
        }
    }
}

impl FromStr for TestResultAvailability {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "available" => Ok(Self::Available),
            other => Err(ParseError::new("result status", other)),
        }
    }
}

/// Calendar day on which a test ended.
///
/// Accepts `2020-12-01` or a full instant such as `2020-12-01T00:00:00Z`
/// (the time of day is discarded); always shown as midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestEndDate(NaiveDate);

impl TestEndDate {
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Self(date));
        }
        DateTime::parse_from_rfc3339(value)
            .map(|instant| Self(instant.with_timezone(&Utc).date_naive()))
            .map_err(|_| ParseError::new("test end date", value))
    }

    pub fn show(self) -> String {
        format!("{}T00:00:00Z", self.0.format("%Y-%m-%d"))
    }
}

impl fmt::Display for TestEndDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.show())
    }
}

impl Serialize for TestEndDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.show())
    }
}

impl<'de> Deserialize<'de> for TestEndDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A result record that has not been finalised yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTestResult {
    pub test_result_polling_token: TestResultPollingToken,
    pub test_kit: TestKit,
}

/// A finalised result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTestResult {
    pub test_result_polling_token: TestResultPollingToken,
    pub test_end_date: TestEndDate,
    pub test_result: TestResult,
    pub test_kit: TestKit,
    /// Absent on records written without a TTL.
    pub expire_at: Option<DateTime<Utc>>,
}

/// A result record: created pending, replaced at most once by an available
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestState {
    Pending(PendingTestResult),
    Available(AvailableTestResult),
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kit_names_roundtrip() {
        for kit in TestKit::ALL {
            assert_eq!(kit.name().parse::<TestKit>().unwrap(), kit);
        }
        assert!("PCR".parse::<TestKit>().is_err());
    }

    #[test]
    fn test_kit_serde_uses_persisted_names() {
        assert_eq!(
            serde_json::to_string(&TestKit::RapidSelfReported).unwrap(),
            "\"RAPID_SELF_REPORTED\""
        );
    }

    #[test]
    fn wire_values_differ_from_tag_names() {
        assert_eq!(TestResult::Positive.wire_value(), "POSITIVE");
        assert_eq!(TestResult::from_wire("VOID").unwrap(), TestResult::Void);
        assert!(TestResult::from_wire("Positive").is_err());
    }

    #[test]
    fn status_text_is_lowercase() {
        assert_eq!(TestResultAvailability::Pending.text(), "pending");
        assert_eq!(
            "available".parse::<TestResultAvailability>().unwrap(),
            TestResultAvailability::Available
        );
        assert!("AVAILABLE".parse::<TestResultAvailability>().is_err());
    }

    #[test]
    fn end_date_accepts_date_or_instant() {
        let from_date = TestEndDate::parse("2020-12-01").unwrap();
        let from_instant = TestEndDate::parse("2020-12-01T13:45:00Z").unwrap();

        assert_eq!(from_date, from_instant);
        assert_eq!(from_date.show(), "2020-12-01T00:00:00Z");
        assert!(TestEndDate::parse("01/12/2020").is_err());
    }

    #[test]
    fn end_date_reparses_its_own_output() {
        let date = TestEndDate::parse("2021-02-28").unwrap();
        assert_eq!(TestEndDate::parse(&date.show()).unwrap(), date);
    }
}
