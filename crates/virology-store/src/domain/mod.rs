//! Domain value types for virology test orders and results.

mod order;
mod test_result;
mod tokens;

pub use order::{SubmissionToken, TestOrder, VirologyResultRequest, VirologyTokenGenRequest};
pub use test_result::{
    AvailableTestResult, PendingTestResult, TestEndDate, TestKit, TestResult,
    TestResultAvailability, TestState,
};
pub use tokens::{CtaToken, DiagnosisKeySubmissionToken, TestResultPollingToken};

/// A stored or submitted string that is not one of the values a closed
/// enumeration accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
