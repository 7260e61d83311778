//! Test orders, submission tokens and result upload requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::test_result::{TestEndDate, TestKit, TestResult};
use super::tokens::{CtaToken, DiagnosisKeySubmissionToken, TestResultPollingToken};

/// One test order and the tokens that hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOrder {
    pub cta_token: CtaToken,
    pub test_result_polling_token: TestResultPollingToken,
    pub diagnosis_key_submission_token: DiagnosisKeySubmissionToken,
    pub expire_at: DateTime<Utc>,
    /// Absent until the first successful exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u32>,
}

impl TestOrder {
    pub const fn new(
        cta_token: CtaToken,
        test_result_polling_token: TestResultPollingToken,
        diagnosis_key_submission_token: DiagnosisKeySubmissionToken,
        expire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cta_token,
            test_result_polling_token,
            diagnosis_key_submission_token,
            expire_at,
            download_count: None,
        }
    }

    /// Successful exchanges so far; an absent counter means none.
    pub fn downloads(&self) -> u32 {
        self.download_count.unwrap_or(0)
    }
}

/// A submission token record. Its presence is what permits a key upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionToken {
    pub diagnosis_key_submission_token: DiagnosisKeySubmissionToken,
    pub test_kit: TestKit,
    pub expire_at: DateTime<Utc>,
}

/// A lab result for an existing order, identified by its polling token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirologyResultRequest {
    pub test_result_polling_token: TestResultPollingToken,
    pub test_end_date: TestEndDate,
    pub test_result: TestResult,
    pub test_kit: TestKit,
}

/// A result for which no order exists yet; tokens are generated on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirologyTokenGenRequest {
    pub test_end_date: TestEndDate,
    pub test_result: TestResult,
    pub test_kit: TestKit,
}
