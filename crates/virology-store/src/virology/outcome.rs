use serde::Serialize;

use crate::domain::{
    AvailableTestResult, DiagnosisKeySubmissionToken, TestEndDate, TestKit, TestResult,
};

/// Result of polling with a polling token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "camelCase")]
pub enum LookupResult {
    NotFound,
    Pending,
    Available(AvailableTestResult),
}

/// What a client receives for a successfully exchanged order token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaExchangeResponse {
    pub diagnosis_key_submission_token: DiagnosisKeySubmissionToken,
    pub test_result: TestResult,
    pub test_end_date: TestEndDate,
    pub test_kit: TestKit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "response", rename_all = "camelCase")]
pub enum CtaExchangeResult {
    NotFound,
    Pending,
    Available(CtaExchangeResponse),
}

/// Whether an order token can still be exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Consumable,
    Other,
}
