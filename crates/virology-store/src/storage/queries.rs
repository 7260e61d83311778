//! Single-record queries for the virology store.

use virology_core::db::DatabaseError;

use super::db::VirologyDatabase;
use super::models::{SubmissionTokenRow, TableCounts, TestOrderRow, TestResultRow};

impl VirologyDatabase {
    // =========================================================================
    // Test order queries
    // =========================================================================

    /// Get a test order by CTA token.
    pub async fn get_test_order(
        &self,
        cta_token: &str,
    ) -> Result<Option<TestOrderRow>, DatabaseError> {
        let order =
            sqlx::query_as::<_, TestOrderRow>("SELECT * FROM test_orders WHERE ctaToken = ?")
                .bind(cta_token)
                .fetch_optional(self.pool())
                .await?;

        Ok(order)
    }

    /// Find the order owning a polling token via the secondary index.
    pub async fn find_test_order_by_polling_token(
        &self,
        polling_token: &str,
    ) -> Result<Option<TestOrderRow>, DatabaseError> {
        let order = sqlx::query_as::<_, TestOrderRow>(
            "SELECT * FROM test_orders WHERE testResultPollingToken = ? LIMIT 1",
        )
        .bind(polling_token)
        .fetch_optional(self.pool())
        .await?;

        Ok(order)
    }

    // =========================================================================
    // Test result queries
    // =========================================================================

    /// Get a raw result record by polling token.
    pub async fn get_test_result(
        &self,
        polling_token: &str,
    ) -> Result<Option<TestResultRow>, DatabaseError> {
        let result = sqlx::query_as::<_, TestResultRow>(
            "SELECT * FROM test_results WHERE testResultPollingToken = ?",
        )
        .bind(polling_token)
        .fetch_optional(self.pool())
        .await?;

        Ok(result)
    }

    /// Write a raw result record, replacing any record under the same key.
    ///
    /// Unconditional; normal writes go through `transact_write`. Used to
    /// import records and to seed legacy or damaged records.
    pub async fn put_test_result(&self, row: &TestResultRow) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT OR REPLACE INTO test_results (testResultPollingToken, status, testEndDate, testResult, testKit, expireAt) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.test_result_polling_token)
        .bind(&row.status)
        .bind(&row.test_end_date)
        .bind(&row.test_result)
        .bind(&row.test_kit)
        .bind(row.expire_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // =========================================================================
    // Submission token queries
    // =========================================================================

    /// Get a submission token record.
    pub async fn get_submission_token(
        &self,
        submission_token: &str,
    ) -> Result<Option<SubmissionTokenRow>, DatabaseError> {
        let token = sqlx::query_as::<_, SubmissionTokenRow>(
            "SELECT * FROM submission_tokens WHERE diagnosisKeySubmissionToken = ?",
        )
        .bind(submission_token)
        .fetch_optional(self.pool())
        .await?;

        Ok(token)
    }

    /// Delete a submission token once its key upload has been accepted.
    pub async fn delete_submission_token(
        &self,
        submission_token: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM submission_tokens WHERE diagnosisKeySubmissionToken = ?")
                .bind(submission_token)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Count the records in each table.
    pub async fn count_records(&self) -> Result<TableCounts, DatabaseError> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM test_orders), (SELECT COUNT(*) FROM test_results), (SELECT COUNT(*) FROM submission_tokens)",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(TableCounts {
            orders: row.0.unsigned_abs(),
            results: row.1.unsigned_abs(),
            submission_tokens: row.2.unsigned_abs(),
        })
    }

    /// Remove every record whose `expireAt` is at or before `now` (epoch
    /// seconds). Records without an `expireAt` never expire.
    pub async fn reap_expired(&self, now: i64) -> Result<TableCounts, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let orders = sqlx::query("DELETE FROM test_orders WHERE expireAt <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let results = sqlx::query(
            "DELETE FROM test_results WHERE expireAt IS NOT NULL AND expireAt <= ?",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let submission_tokens = sqlx::query(
            "DELETE FROM submission_tokens WHERE expireAt IS NOT NULL AND expireAt <= ?",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(TableCounts {
            orders,
            results,
            submission_tokens,
        })
    }
}
