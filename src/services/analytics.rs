//! Rebuilds per-coupon usage analytics from the order ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};
use crate::domain::aggregates::{CouponAnalytics, CouponPatch, LedgerOrder, OrderStatus};
use crate::domain::value_objects::CouponCode;
use crate::ledger::{OrderLedger, OrderQuery};
use crate::store::CouponStore;
use crate::Result;

#[derive(Clone)]
pub struct AnalyticsRecalculator {
    store: Arc<dyn CouponStore>,
    ledger: Arc<dyn OrderLedger>,
}

impl AnalyticsRecalculator {
    pub fn new(store: Arc<dyn CouponStore>, ledger: Arc<dyn OrderLedger>) -> Self { Self { store, ledger } }

    /// Overwrites the coupon's usage cache from a full ledger scan. Running it
    /// again without ledger changes writes the same values. Applied order ids whose
    /// orders were cancelled or deleted are dropped.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn recalculate(&self, code: &CouponCode) -> Result<CouponAnalytics> {
        let orders = self.ledger.find_orders(&OrderQuery::for_coupon(code)).await?;
        let analytics = build_analytics(&orders);
        let counted: BTreeSet<String> = orders.iter().filter(|o| o.counts_as_usage()).map(|o| o.id.clone()).collect();
        let patch = CouponPatch::usage(analytics.usage_count, analytics.user_usages.clone())
            .with_analytics(analytics.clone())
            .retaining_orders(counted);
        self.store.update_fields(code, patch).await?;
        info!(total = analytics.total, usage_count = analytics.usage_count, "coupon analytics recalculated");
        Ok(analytics)
    }
}

/// `usage_count` counts every order that counts as usage, including orders placed
/// without an email, so it can exceed the sum of `user_usages`.
pub fn build_analytics(orders: &[LedgerOrder]) -> CouponAnalytics {
    let mut analytics = CouponAnalytics::default();
    let mut user_usages: BTreeMap<String, u32> = BTreeMap::new();
    for order in orders {
        analytics.total += 1;
        let bucket = match order.status {
            OrderStatus::Pending => &mut analytics.pending,
            OrderStatus::Processing => &mut analytics.processing,
            OrderStatus::Completed => &mut analytics.completed,
            OrderStatus::Cancelled => &mut analytics.cancelled,
            OrderStatus::Failed => &mut analytics.failed,
            OrderStatus::AwaitingStock => &mut analytics.awaiting_stock,
            OrderStatus::PartiallyFulfilled => &mut analytics.partially_fulfilled,
            OrderStatus::Other(_) => &mut analytics.other,
        };
        *bucket += 1;

        if !order.counts_as_usage() { continue; }
        analytics.usage_count += 1;
        if let Some(email) = &order.email {
            *user_usages.entry(email.to_string()).or_default() += 1;
        }
    }
    analytics.user_usages = user_usages;
    analytics
}
