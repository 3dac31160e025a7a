//! Usage accounting against the order ledger.

use std::sync::Arc;
use tracing::instrument;
use crate::domain::aggregates::LedgerOrder;
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use crate::ledger::{OrderLedger, OrderQuery};
use crate::Result;

/// Computes real coupon usage by scanning the ledger. Cached counters on the
/// coupon record are never consulted here.
#[derive(Clone)]
pub struct UsageAccountant {
    ledger: Arc<dyn OrderLedger>,
}

impl UsageAccountant {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self { Self { ledger } }

    /// Orders referencing `code` that count as usage.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn real_usage_count(&self, code: &CouponCode) -> Result<u32> {
        let count = self.ledger.count_orders(&OrderQuery::for_coupon(code).counted_usage()).await?;
        Ok(saturate(count))
    }

    /// As [`real_usage_count`](Self::real_usage_count), restricted to one purchaser.
    #[instrument(skip(self, email), fields(code = %code))]
    pub async fn user_usage_count(&self, code: &CouponCode, email: &CustomerEmail) -> Result<u32> {
        let query = OrderQuery::for_coupon(code).by_email(email).counted_usage();
        Ok(saturate(self.ledger.count_orders(&query).await?))
    }

    /// The ledger entry for an order, used to decide whether an earlier apply
    /// for it still stands.
    pub async fn order(&self, order_id: &str) -> Result<Option<LedgerOrder>> {
        self.ledger.find_order(order_id).await
    }
}

fn saturate(count: u64) -> u32 { u32::try_from(count).unwrap_or(u32::MAX) }
