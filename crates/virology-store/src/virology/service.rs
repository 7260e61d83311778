use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};
use virology_core::Clock;
use virology_core::config::VirologyConfig;

use super::outcome::{CtaExchangeResponse, CtaExchangeResult, LookupResult, TokenStatus};
use crate::domain::{
    CtaToken, TestOrder, TestResult, TestResultPollingToken, TestState, VirologyResultRequest,
    VirologyTokenGenRequest,
};
use crate::persistence::{
    PersistenceError, ResultPersistOutcome, VirologyDataTimeToLiveCalculator,
    VirologyPersistenceService, add_saturating, secs_to_delta,
};
use crate::tokens::{TokensGenerator, validate_cta_token};

type Result<T> = std::result::Result<T, PersistenceError>;

pub struct VirologyService {
    persistence: VirologyPersistenceService,
    tokens: TokensGenerator,
    clock: Arc<dyn Clock>,
    ttl: VirologyDataTimeToLiveCalculator,
    order_expiry: TimeDelta,
    max_cta_exchange_count: u32,
}

impl VirologyService {
    pub const DEFAULT_MAX_CTA_EXCHANGE_COUNT: u32 = 2;

    /// A service with the default policy: orders live four weeks, results may
    /// be exchanged twice and retrieved data uses the default TTL.
    pub fn new(
        persistence: VirologyPersistenceService,
        tokens: TokensGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            tokens,
            clock,
            ttl: VirologyDataTimeToLiveCalculator::default_ttl(),
            order_expiry: TimeDelta::weeks(4),
            max_cta_exchange_count: Self::DEFAULT_MAX_CTA_EXCHANGE_COUNT,
        }
    }

    pub fn from_config(
        persistence: VirologyPersistenceService,
        tokens: TokensGenerator,
        clock: Arc<dyn Clock>,
        config: &VirologyConfig,
    ) -> Self {
        Self {
            persistence,
            tokens,
            clock,
            ttl: VirologyDataTimeToLiveCalculator::from_config(config),
            order_expiry: secs_to_delta(config.order_expiry_secs),
            max_cta_exchange_count: config.max_cta_exchange_count,
        }
    }

    pub const fn persistence(&self) -> &VirologyPersistenceService {
        &self.persistence
    }

    fn order_expire_at(&self) -> DateTime<Utc> {
        add_saturating(self.clock.now(), self.order_expiry)
    }

    /// Create a new order with a pending result.
    pub async fn order_test(&self) -> Result<TestOrder> {
        let expire_at = self.order_expire_at();
        self.persistence
            .persist_test_order(self.tokens.order_supplier(expire_at), expire_at)
            .await
    }

    /// Record a lab result. Only a positive result enables a key upload.
    pub async fn accept_test_result(
        &self,
        request: &VirologyResultRequest,
    ) -> Result<ResultPersistOutcome> {
        match request.test_result {
            TestResult::Positive => {
                self.persistence
                    .persist_test_result_with_key_submission(request, self.order_expire_at())
                    .await
            }
            TestResult::Negative | TestResult::Void => {
                self.persistence
                    .persist_test_result_without_key_submission(request)
                    .await
            }
        }
    }

    /// Record a result that has no order yet, generating one for it.
    pub async fn accept_test_result_generating_tokens(
        &self,
        request: &VirologyTokenGenRequest,
    ) -> Result<TestOrder> {
        let expire_at = self.order_expire_at();
        let order = self
            .persistence
            .persist_test_order_and_result(
                self.tokens.order_supplier(expire_at),
                expire_at,
                request.test_result,
                request.test_end_date,
                request.test_kit,
            )
            .await?;

        info!(cta_token = %order.cta_token, "Token gen created order");
        Ok(order)
    }

    /// Poll for a result. Handing out an available result starts its
    /// retention countdown.
    pub async fn lookup_test_result(
        &self,
        polling_token: &TestResultPollingToken,
    ) -> Result<LookupResult> {
        match self.persistence.get_test_result(polling_token).await? {
            None => Ok(LookupResult::NotFound),
            Some(TestState::Pending(_)) => Ok(LookupResult::Pending),
            Some(TestState::Available(result)) => {
                let ttl = self.ttl.compute(self.clock.now());
                let marked = self.persistence.mark_for_deletion(&result, ttl).await;
                tolerate_deletion_conflict(marked, polling_token)?;
                Ok(LookupResult::Available(result))
            }
        }
    }

    /// Exchange an order token for its result, counting the download.
    pub async fn exchange_cta_token(&self, cta_token: &CtaToken) -> Result<CtaExchangeResult> {
        let Some(order) = self.persistence.get_test_order(cta_token).await? else {
            info!(cta_token = %cta_token, "Order token not found");
            return Ok(CtaExchangeResult::NotFound);
        };

        // The limit is enforced again inside the exchange write.
        if order.downloads() >= self.max_cta_exchange_count {
            info!(
                cta_token = %cta_token,
                downloads = order.downloads(),
                "Order token exchange limit reached"
            );
            return Ok(CtaExchangeResult::NotFound);
        }

        match self
            .persistence
            .get_test_result(&order.test_result_polling_token)
            .await?
        {
            None => {
                info!(
                    cta_token = %cta_token,
                    polling_token = %order.test_result_polling_token,
                    "No test result for order"
                );
                Ok(CtaExchangeResult::NotFound)
            }
            Some(TestState::Pending(_)) => {
                info!(cta_token = %cta_token, "Test result not available yet");
                Ok(CtaExchangeResult::Pending)
            }
            Some(TestState::Available(result)) => {
                let ttl = self.ttl.compute(self.clock.now());
                let counted = self
                    .persistence
                    .update_on_cta_exchange(&order, &result, ttl, self.max_cta_exchange_count)
                    .await?;
                if !counted {
                    return Ok(CtaExchangeResult::NotFound);
                }

                info!(cta_token = %cta_token, "Order token exchange successful");
                Ok(CtaExchangeResult::Available(CtaExchangeResponse {
                    diagnosis_key_submission_token: order.diagnosis_key_submission_token,
                    test_result: result.test_result,
                    test_end_date: result.test_end_date,
                    test_kit: result.test_kit,
                }))
            }
        }
    }

    /// `Consumable` when `raw` is a well-formed order token whose order has
    /// never been exchanged.
    pub async fn check_token_status(&self, raw: &str) -> Result<TokenStatus> {
        if !validate_cta_token(raw) {
            return Ok(TokenStatus::Other);
        }

        let order = self.persistence.get_test_order(&CtaToken::of(raw)).await?;
        Ok(match order {
            Some(order) if order.downloads() == 0 => TokenStatus::Consumable,
            _ => TokenStatus::Other,
        })
    }
}

/// A result already handed out stays handed out when the deletion marking
/// loses a race; only the conflict is swallowed.
fn tolerate_deletion_conflict(
    marked: Result<()>,
    polling_token: &TestResultPollingToken,
) -> Result<()> {
    match marked {
        Err(PersistenceError::TransactionConflict(reason)) => {
            warn!(
                polling_token = %polling_token,
                %reason,
                "Failed to mark test result for deletion"
            );
            Ok(())
        }
        other => other,
    }
}
