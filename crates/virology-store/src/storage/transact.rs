//! All-or-nothing multi-record writes.
//!
//! A transaction is a list of [`TransactWriteItem`]s. Some items carry a
//! condition; if any condition does not hold when the item is applied, every
//! write already made in the transaction is rolled back and the caller gets
//! [`TransactWriteError::Cancelled`] naming the failed condition.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use virology_core::clock::epoch_seconds;
use virology_core::db::DatabaseError;

use super::db::VirologyDatabase;
use crate::domain::{
    CtaToken, DiagnosisKeySubmissionToken, TestEndDate, TestKit, TestOrder, TestResult,
    TestResultAvailability, TestResultPollingToken,
};

/// A condition attached to a transaction item that did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConditionFailure {
    #[error("a test order with this CTA token already exists")]
    OrderTokenExists,

    #[error("the test result is no longer pending")]
    ResultNotPending,

    #[error("the submission token does not exist")]
    SubmissionTokenMissing,

    #[error("the test order is gone or has no downloads left")]
    DownloadLimitReached,
}

#[derive(Debug, thiserror::Error)]
pub enum TransactWriteError {
    #[error("Transaction cancelled: {0}")]
    Cancelled(ConditionFailure),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for TransactWriteError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.into())
    }
}

/// One write inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactWriteItem {
    /// Insert an order. Condition: no order with this CTA token exists.
    PutTestOrder(TestOrder),

    /// Put a pending result, replacing any record under the key.
    PutPendingResult {
        polling_token: TestResultPollingToken,
        expire_at: DateTime<Utc>,
    },

    /// Put an available result, replacing any record under the key.
    PutAvailableResult {
        polling_token: TestResultPollingToken,
        test_end_date: TestEndDate,
        test_result: TestResult,
        test_kit: TestKit,
        expire_at: DateTime<Utc>,
    },

    /// Put a submission token, replacing any record under the key.
    PutSubmissionToken {
        submission_token: DiagnosisKeySubmissionToken,
        test_kit: TestKit,
        expire_at: DateTime<Utc>,
    },

    /// Overwrite every result field with an available result, keeping the
    /// record's `expireAt`. Condition: the record is currently pending.
    MarkResultAvailable {
        polling_token: TestResultPollingToken,
        test_end_date: TestEndDate,
        test_result: TestResult,
        test_kit: TestKit,
    },

    /// Rewrite an order's TTL. With a `download_limit` one more download is
    /// counted as well. Condition: fewer than `download_limit` downloads were
    /// counted before.
    UpdateOrderExpiry {
        cta_token: CtaToken,
        expire_at: DateTime<Utc>,
        download_limit: Option<u32>,
    },

    /// Rewrite a result's TTL.
    UpdateResultExpiry {
        polling_token: TestResultPollingToken,
        expire_at: DateTime<Utc>,
    },

    /// Rewrite a submission token's TTL. Condition: the token exists.
    UpdateSubmissionTokenExpiry {
        submission_token: DiagnosisKeySubmissionToken,
        expire_at: DateTime<Utc>,
    },
}

impl TransactWriteItem {
    /// The condition this item carries, if any.
    pub const fn condition(&self) -> Option<ConditionFailure> {
        match self {
            Self::PutTestOrder(_) => Some(ConditionFailure::OrderTokenExists),
            Self::MarkResultAvailable { .. } => Some(ConditionFailure::ResultNotPending),
            Self::UpdateSubmissionTokenExpiry { .. } => {
                Some(ConditionFailure::SubmissionTokenMissing)
            }
            Self::UpdateOrderExpiry {
                download_limit: Some(_),
                ..
            } => Some(ConditionFailure::DownloadLimitReached),
            _ => None,
        }
    }

    /// Apply the write and return the number of rows it touched. Conditioned
    /// items touch no rows when their condition does not hold.
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = match self {
            Self::PutTestOrder(order) => {
                sqlx::query(
                    "INSERT INTO test_orders (ctaToken, testResultPollingToken, diagnosisKeySubmissionToken, expireAt, downloadCount) VALUES (?, ?, ?, ?, ?) ON CONFLICT(ctaToken) DO NOTHING",
                )
                .bind(order.cta_token.as_str())
                .bind(order.test_result_polling_token.as_str())
                .bind(order.diagnosis_key_submission_token.as_str())
                .bind(epoch_seconds(order.expire_at))
                .bind(order.download_count.map(i64::from))
                .execute(&mut *conn)
                .await?
            }
            Self::PutPendingResult {
                polling_token,
                expire_at,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO test_results (testResultPollingToken, status, expireAt) VALUES (?, ?, ?)",
                )
                .bind(polling_token.as_str())
                .bind(TestResultAvailability::Pending.text())
                .bind(epoch_seconds(*expire_at))
                .execute(&mut *conn)
                .await?
            }
            Self::PutAvailableResult {
                polling_token,
                test_end_date,
                test_result,
                test_kit,
                expire_at,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO test_results (testResultPollingToken, status, testEndDate, testResult, testKit, expireAt) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(polling_token.as_str())
                .bind(TestResultAvailability::Available.text())
                .bind(test_end_date.show())
                .bind(test_result.wire_value())
                .bind(test_kit.name())
                .bind(epoch_seconds(*expire_at))
                .execute(&mut *conn)
                .await?
            }
            Self::PutSubmissionToken {
                submission_token,
                test_kit,
                expire_at,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO submission_tokens (diagnosisKeySubmissionToken, testKit, expireAt) VALUES (?, ?, ?)",
                )
                .bind(submission_token.as_str())
                .bind(test_kit.name())
                .bind(epoch_seconds(*expire_at))
                .execute(&mut *conn)
                .await?
            }
            Self::MarkResultAvailable {
                polling_token,
                test_end_date,
                test_result,
                test_kit,
            } => {
                sqlx::query(
                    "UPDATE test_results SET status = ?, testEndDate = ?, testResult = ?, testKit = ? WHERE testResultPollingToken = ? AND status = ?",
                )
                .bind(TestResultAvailability::Available.text())
                .bind(test_end_date.show())
                .bind(test_result.wire_value())
                .bind(test_kit.name())
                .bind(polling_token.as_str())
                .bind(TestResultAvailability::Pending.text())
                .execute(&mut *conn)
                .await?
            }
            Self::UpdateOrderExpiry {
                cta_token,
                expire_at,
                download_limit: None,
            } => {
                sqlx::query("UPDATE test_orders SET expireAt = ? WHERE ctaToken = ?")
                    .bind(epoch_seconds(*expire_at))
                    .bind(cta_token.as_str())
                    .execute(&mut *conn)
                    .await?
            }
            Self::UpdateOrderExpiry {
                cta_token,
                expire_at,
                download_limit: Some(limit),
            } => {
                sqlx::query(
                    "UPDATE test_orders SET expireAt = ?, downloadCount = COALESCE(downloadCount, 0) + 1 WHERE ctaToken = ? AND COALESCE(downloadCount, 0) < ?",
                )
                .bind(epoch_seconds(*expire_at))
                .bind(cta_token.as_str())
                .bind(i64::from(*limit))
                .execute(&mut *conn)
                .await?
            }
            Self::UpdateResultExpiry {
                polling_token,
                expire_at,
            } => {
                sqlx::query("UPDATE test_results SET expireAt = ? WHERE testResultPollingToken = ?")
                    .bind(epoch_seconds(*expire_at))
                    .bind(polling_token.as_str())
                    .execute(&mut *conn)
                    .await?
            }
            Self::UpdateSubmissionTokenExpiry {
                submission_token,
                expire_at,
            } => {
                sqlx::query(
                    "UPDATE submission_tokens SET expireAt = ? WHERE diagnosisKeySubmissionToken = ?",
                )
                .bind(epoch_seconds(*expire_at))
                .bind(submission_token.as_str())
                .execute(&mut *conn)
                .await?
            }
        };

        Ok(result.rows_affected())
    }
}

impl VirologyDatabase {
    /// Apply `items` in order inside one transaction.
    ///
    /// Either every item is written or none is. An empty list is a no-op.
    pub async fn transact_write(&self, items: &[TransactWriteItem]) -> Result<(), TransactWriteError> {
        let mut tx = self.pool().begin().await?;

        for item in items {
            let rows = item.apply(&mut *tx).await?;
            if let Some(failure) = item.condition()
                && rows == 0
            {
                tx.rollback().await?;
                debug!(reason = %failure, items = items.len(), "Transaction cancelled");
                return Err(TransactWriteError::Cancelled(failure));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
