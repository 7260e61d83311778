use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use virology_core::config::VirologyConfig;

use super::error::{PersistenceError, ResultPersistOutcome};
use super::records;
use super::ttl::VirologyDataTimeToLive;
use crate::domain::{
    AvailableTestResult, CtaToken, DiagnosisKeySubmissionToken, SubmissionToken, TestEndDate,
    TestKit, TestOrder, TestResult, TestResultPollingToken, TestState, VirologyResultRequest,
};
use crate::storage::{ConditionFailure, TransactWriteError, TransactWriteItem, VirologyDatabase};

type Result<T> = std::result::Result<T, PersistenceError>;

/// Reads and writes test orders, results and submission tokens.
#[derive(Clone)]
pub struct VirologyPersistenceService {
    db: VirologyDatabase,
    max_order_token_retries: u32,
}

impl VirologyPersistenceService {
    pub const DEFAULT_MAX_ORDER_TOKEN_RETRIES: u32 = 2;

    /// `max_order_token_retries` counts attempts after the first, so a budget
    /// of 2 calls the order supplier at most 3 times.
    pub const fn new(db: VirologyDatabase, max_order_token_retries: u32) -> Self {
        Self {
            db,
            max_order_token_retries,
        }
    }

    pub const fn from_config(db: VirologyDatabase, config: &VirologyConfig) -> Self {
        Self::new(db, config.max_order_token_retries)
    }

    pub const fn database(&self) -> &VirologyDatabase {
        &self.db
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_test_order(&self, cta_token: &CtaToken) -> Result<Option<TestOrder>> {
        debug!(cta_token = %cta_token, "Reading test order");
        self.db
            .get_test_order(cta_token.as_str())
            .await?
            .map(records::test_order)
            .transpose()
    }

    /// Read a result, discriminating pending from available by its status.
    pub async fn get_test_result(
        &self,
        polling_token: &TestResultPollingToken,
    ) -> Result<Option<TestState>> {
        debug!(polling_token = %polling_token, "Reading test result");
        self.db
            .get_test_result(polling_token.as_str())
            .await?
            .map(records::test_state)
            .transpose()
    }

    pub async fn get_submission_token(
        &self,
        submission_token: &DiagnosisKeySubmissionToken,
    ) -> Result<Option<SubmissionToken>> {
        self.db
            .get_submission_token(submission_token.as_str())
            .await?
            .map(records::submission_token)
            .transpose()
    }

    async fn find_order_for(
        &self,
        polling_token: &TestResultPollingToken,
    ) -> Result<Option<TestOrder>> {
        self.db
            .find_test_order_by_polling_token(polling_token.as_str())
            .await?
            .map(records::test_order)
            .transpose()
    }

    // =========================================================================
    // Order creation
    // =========================================================================

    /// Insert a fresh order together with its pending result.
    ///
    /// `supplier` is called once per attempt; a candidate whose order token
    /// already exists is discarded and the supplier is asked again. The order
    /// is stored exactly as supplied and the pending result expires at
    /// `expire_at`.
    pub async fn persist_test_order<F>(
        &self,
        supplier: F,
        expire_at: DateTime<Utc>,
    ) -> Result<TestOrder>
    where
        F: FnMut() -> TestOrder,
    {
        self.persist_with_fresh_tokens(supplier, |order| {
            vec![
                TransactWriteItem::PutTestOrder(order.clone()),
                TransactWriteItem::PutPendingResult {
                    polling_token: order.test_result_polling_token.clone(),
                    expire_at,
                },
            ]
        })
        .await
    }

    /// Insert a fresh order with an already available result, for results
    /// that arrive before any order exists. A positive result also gets a
    /// submission token.
    pub async fn persist_test_order_and_result<F>(
        &self,
        supplier: F,
        expire_at: DateTime<Utc>,
        test_result: TestResult,
        test_end_date: TestEndDate,
        test_kit: TestKit,
    ) -> Result<TestOrder>
    where
        F: FnMut() -> TestOrder,
    {
        self.persist_with_fresh_tokens(supplier, |order| {
            let mut items = vec![
                TransactWriteItem::PutTestOrder(order.clone()),
                TransactWriteItem::PutAvailableResult {
                    polling_token: order.test_result_polling_token.clone(),
                    test_end_date,
                    test_result,
                    test_kit,
                    expire_at,
                },
            ];
            if test_result == TestResult::Positive {
                items.push(TransactWriteItem::PutSubmissionToken {
                    submission_token: order.diagnosis_key_submission_token.clone(),
                    test_kit,
                    expire_at,
                });
            }
            items
        })
        .await
    }

    async fn persist_with_fresh_tokens<F, W>(&self, mut supplier: F, writes: W) -> Result<TestOrder>
    where
        F: FnMut() -> TestOrder,
        W: Fn(&TestOrder) -> Vec<TransactWriteItem>,
    {
        let attempts = self.max_order_token_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let order = supplier();
            match self.db.transact_write(&writes(&order)).await {
                Ok(()) => {
                    info!(cta_token = %order.cta_token, attempt, "Test order persisted");
                    return Ok(order);
                }
                Err(TransactWriteError::Cancelled(ConditionFailure::OrderTokenExists)) => {
                    warn!(
                        cta_token = %order.cta_token,
                        attempt,
                        "Order token already exists, retrying with fresh tokens"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PersistenceError::RetryExhausted { attempts })
    }

    // =========================================================================
    // Result recording
    // =========================================================================

    /// Finalise the pending result and create the order's submission token,
    /// expiring at `expire_at`, in one transaction.
    pub async fn persist_test_result_with_key_submission(
        &self,
        request: &VirologyResultRequest,
        expire_at: DateTime<Utc>,
    ) -> Result<ResultPersistOutcome> {
        self.persist_result(request, Some(expire_at)).await
    }

    /// Finalise the pending result without enabling a key upload.
    pub async fn persist_test_result_without_key_submission(
        &self,
        request: &VirologyResultRequest,
    ) -> Result<ResultPersistOutcome> {
        self.persist_result(request, None).await
    }

    async fn persist_result(
        &self,
        request: &VirologyResultRequest,
        submission_expire_at: Option<DateTime<Utc>>,
    ) -> Result<ResultPersistOutcome> {
        let polling_token = &request.test_result_polling_token;
        let Some(order) = self.find_order_for(polling_token).await? else {
            info!(polling_token = %polling_token, "No test order for uploaded result");
            return Ok(ResultPersistOutcome::OrderNotFound);
        };

        let mut items = vec![TransactWriteItem::MarkResultAvailable {
            polling_token: polling_token.clone(),
            test_end_date: request.test_end_date,
            test_result: request.test_result,
            test_kit: request.test_kit,
        }];
        if let Some(expire_at) = submission_expire_at {
            items.push(TransactWriteItem::PutSubmissionToken {
                submission_token: order.diagnosis_key_submission_token.clone(),
                test_kit: request.test_kit,
                expire_at,
            });
        }

        match self.db.transact_write(&items).await {
            Ok(()) => {
                info!(
                    cta_token = %order.cta_token,
                    test_result = %request.test_result,
                    test_kit = %request.test_kit,
                    key_submission = submission_expire_at.is_some(),
                    "Test result persisted"
                );
                Ok(ResultPersistOutcome::Success)
            }
            Err(TransactWriteError::Cancelled(reason)) => {
                warn!(
                    cta_token = %order.cta_token,
                    %reason,
                    "Persistence of test result was cancelled"
                );
                Ok(ResultPersistOutcome::TransactionFailed)
            }
            Err(TransactWriteError::Database(e)) => Err(e.into()),
        }
    }

    // =========================================================================
    // Expiry marking
    // =========================================================================

    /// Bring forward the expiry of an available result, its order and (if it
    /// still exists) the order's submission token.
    ///
    /// A result without an order is left alone. A submission token deleted
    /// between the existence check and the write surfaces as
    /// [`PersistenceError::TransactionConflict`].
    pub async fn mark_for_deletion(
        &self,
        result: &AvailableTestResult,
        ttl: VirologyDataTimeToLive,
    ) -> Result<()> {
        let polling_token = &result.test_result_polling_token;
        let Some(order) = self.find_order_for(polling_token).await? else {
            info!(polling_token = %polling_token, "No test order to mark for deletion");
            return Ok(());
        };

        let items = self.expiry_writes(&order, ttl, None).await?;
        self.db.transact_write(&items).await?;

        debug!(
            cta_token = %order.cta_token,
            test_data_expire_at = %ttl.test_data_expire_at,
            "Test order marked for deletion"
        );
        Ok(())
    }

    /// Count one more download of `order` and apply the same expiry as
    /// [`Self::mark_for_deletion`], in one transaction.
    ///
    /// Returns `false` when the order already has `max_downloads` downloads
    /// counted, in which case nothing is written and the result must not be
    /// handed out. Any other lost race is logged and still returns `true`.
    pub async fn update_on_cta_exchange(
        &self,
        order: &TestOrder,
        result: &AvailableTestResult,
        ttl: VirologyDataTimeToLive,
        max_downloads: u32,
    ) -> Result<bool> {
        let items = self.expiry_writes(order, ttl, Some(max_downloads)).await?;

        match self.db.transact_write(&items).await {
            Ok(()) => {
                debug!(cta_token = %order.cta_token, "Test order updated on exchange");
                Ok(true)
            }
            Err(TransactWriteError::Cancelled(ConditionFailure::DownloadLimitReached)) => {
                info!(
                    cta_token = %order.cta_token,
                    max_downloads,
                    "Order token has no downloads left"
                );
                Ok(false)
            }
            Err(TransactWriteError::Cancelled(reason)) => {
                warn!(
                    cta_token = %order.cta_token,
                    polling_token = %order.test_result_polling_token,
                    submission_token = %order.diagnosis_key_submission_token,
                    test_result = %result.test_result,
                    %reason,
                    "Failed to update test order on exchange"
                );
                Ok(true)
            }
            Err(TransactWriteError::Database(e)) => Err(e.into()),
        }
    }

    /// Order and result expire at the test data TTL; the submission token is
    /// only touched when it exists, and the write is conditioned on it
    /// still existing.
    pub(super) async fn expiry_writes(
        &self,
        order: &TestOrder,
        ttl: VirologyDataTimeToLive,
        download_limit: Option<u32>,
    ) -> Result<Vec<TransactWriteItem>> {
        let mut items = vec![
            TransactWriteItem::UpdateOrderExpiry {
                cta_token: order.cta_token.clone(),
                expire_at: ttl.test_data_expire_at,
                download_limit,
            },
            TransactWriteItem::UpdateResultExpiry {
                polling_token: order.test_result_polling_token.clone(),
                expire_at: ttl.test_data_expire_at,
            },
        ];

        let submission_token = &order.diagnosis_key_submission_token;
        if self
            .db
            .get_submission_token(submission_token.as_str())
            .await?
            .is_some()
        {
            items.push(TransactWriteItem::UpdateSubmissionTokenExpiry {
                submission_token: submission_token.clone(),
                expire_at: ttl.submission_data_expire_at,
            });
        }

        Ok(items)
    }
}
