//! Raw records as stored.
//!
//! Field names map onto the persisted column names. Non-key result and
//! submission token fields are optional because older or damaged records may
//! lack them; turning a row into a domain value is the caller's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct TestOrderRow {
    pub cta_token: String,
    pub test_result_polling_token: String,
    pub diagnosis_key_submission_token: String,
    pub expire_at: i64,
    pub download_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct TestResultRow {
    pub test_result_polling_token: String,
    pub status: Option<String>,
    pub test_end_date: Option<String>,
    pub test_result: Option<String>,
    pub test_kit: Option<String>,
    pub expire_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct SubmissionTokenRow {
    pub diagnosis_key_submission_token: String,
    pub test_kit: Option<String>,
    pub expire_at: Option<i64>,
}

/// Per-table record counts, e.g. the records removed by one reap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub orders: u64,
    pub results: u64,
    pub submission_tokens: u64,
}

impl TableCounts {
    pub const fn total(&self) -> u64 {
        self.orders + self.results + self.submission_tokens
    }
}
