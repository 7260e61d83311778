//! Conversion of raw stored rows into domain values.
//!
//! Absence of a whole record is `None` at the query layer; a record that is
//! present but malformed is a [`PersistenceError`] here.

use chrono::{DateTime, Utc};
use virology_core::clock::from_epoch_seconds;

use super::error::PersistenceError;
use crate::domain::{
    AvailableTestResult, CtaToken, DiagnosisKeySubmissionToken, PendingTestResult,
    SubmissionToken, TestEndDate, TestKit, TestOrder, TestResult, TestResultAvailability,
    TestResultPollingToken, TestState,
};
use crate::storage::{SubmissionTokenRow, TestOrderRow, TestResultRow};

fn invalid(field: &'static str, value: impl ToString) -> PersistenceError {
    PersistenceError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, PersistenceError> {
    value.ok_or(PersistenceError::RequiredFieldMissing(field))
}

fn instant(field: &'static str, secs: i64) -> Result<DateTime<Utc>, PersistenceError> {
    from_epoch_seconds(secs).ok_or_else(|| invalid(field, secs))
}

/// Missing means the record predates the field.
fn stored_test_kit(value: Option<&str>) -> Result<TestKit, PersistenceError> {
    value.map_or(Ok(TestKit::LEGACY_DEFAULT), |kit| {
        kit.parse().map_err(|_| invalid("testKit", kit))
    })
}

pub(super) fn test_order(row: TestOrderRow) -> Result<TestOrder, PersistenceError> {
    let download_count = row
        .download_count
        .map(|count| u32::try_from(count).map_err(|_| invalid("downloadCount", count)))
        .transpose()?;

    Ok(TestOrder {
        cta_token: CtaToken::of(row.cta_token),
        test_result_polling_token: TestResultPollingToken::of(row.test_result_polling_token),
        diagnosis_key_submission_token: DiagnosisKeySubmissionToken::of(
            row.diagnosis_key_submission_token,
        ),
        expire_at: instant("expireAt", row.expire_at)?,
        download_count,
    })
}

/// Discriminates on `status`. A missing status is corruption, not absence.
pub(super) fn test_state(row: TestResultRow) -> Result<TestState, PersistenceError> {
    let status = required(row.status.as_deref(), "status")?;
    let availability: TestResultAvailability =
        status.parse().map_err(|_| invalid("status", status))?;
    let test_kit = stored_test_kit(row.test_kit.as_deref())?;
    let test_result_polling_token = TestResultPollingToken::of(row.test_result_polling_token);

    match availability {
        TestResultAvailability::Pending => Ok(TestState::Pending(PendingTestResult {
            test_result_polling_token,
            test_kit,
        })),
        TestResultAvailability::Available => {
            let end_date = required(row.test_end_date.as_deref(), "testEndDate")?;
            let result = required(row.test_result.as_deref(), "testResult")?;

            Ok(TestState::Available(AvailableTestResult {
                test_result_polling_token,
                test_end_date: TestEndDate::parse(end_date)
                    .map_err(|_| invalid("testEndDate", end_date))?,
                test_result: TestResult::from_wire(result)
                    .map_err(|_| invalid("testResult", result))?,
                test_kit,
                expire_at: row
                    .expire_at
                    .map(|secs| instant("expireAt", secs))
                    .transpose()?,
            }))
        }
    }
}

pub(super) fn submission_token(
    row: SubmissionTokenRow,
) -> Result<SubmissionToken, PersistenceError> {
    let expire_at = row
        .expire_at
        .ok_or(PersistenceError::RequiredFieldMissing("expireAt"))?;

    Ok(SubmissionToken {
        diagnosis_key_submission_token: DiagnosisKeySubmissionToken::of(
            row.diagnosis_key_submission_token,
        ),
        test_kit: stored_test_kit(row.test_kit.as_deref())?,
        expire_at: instant("expireAt", expire_at)?,
    })
}
