//! Coupon services
//!
//! [`CouponService`] wires the accountant, validator, applier and analytics
//! recalculator over one coupon store and one order ledger.

pub mod accountant;
pub mod analytics;
pub mod applier;
pub mod validator;

pub use accountant::UsageAccountant;
pub use analytics::{build_analytics, AnalyticsRecalculator};
pub use applier::{ApplyRequest, CouponApplier};
pub use validator::{CouponAction, CouponValidator, Rejection, Validation};

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{instrument, warn};
use crate::domain::aggregates::{Coupon, CouponAnalytics, CouponState, NewCoupon, UpdateCoupon};
use crate::domain::events::{CouponEvent, OrderLifecycleEvent};
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use crate::ledger::OrderLedger;
use crate::store::CouponStore;
use crate::{CouponError, Result};

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn CouponStore>,
    accountant: UsageAccountant,
    validator: CouponValidator,
    applier: CouponApplier,
    recalculator: AnalyticsRecalculator,
    nats: Option<async_nats::Client>,
}

impl CouponService {
    pub fn new(store: Arc<dyn CouponStore>, ledger: Arc<dyn OrderLedger>) -> Self {
        let accountant = UsageAccountant::new(ledger.clone());
        let validator = CouponValidator::new(store.clone(), accountant.clone());
        let applier = CouponApplier::new(store.clone(), accountant.clone(), validator.clone());
        let recalculator = AnalyticsRecalculator::new(store.clone(), ledger);
        Self { store, accountant, validator, applier, recalculator, nats: None }
    }

    pub fn with_nats(mut self, nats: Option<async_nats::Client>) -> Self { self.nats = nats; self }

    pub fn accountant(&self) -> &UsageAccountant { &self.accountant }

    /// Preview; never writes.
    pub async fn validate_coupon(&self, code: &str, amount: Decimal, email: Option<&str>) -> Validation {
        self.validator.validate(code, amount, email).await
    }

    /// Called once per confirmed payment.
    pub async fn apply_coupon(&self, request: ApplyRequest) -> Validation {
        let order_id = request.order_id.clone();
        let email = CustomerEmail::parse_optional(request.email.as_deref());
        let outcome = self.applier.apply(request).await;
        if let Validation::Approved { discount, coupon } = &outcome {
            self.publish(CouponEvent::UsageApplied {
                code: coupon.code.clone(), email, order_id, discount: *discount, usage_count: coupon.usage_count,
            }).await;
        }
        outcome
    }

    pub async fn recalculate_coupon_analytics(&self, code: &str) -> Result<CouponAnalytics> {
        let code = CouponCode::new(code).map_err(|_| CouponError::CouponNotFound)?;
        let analytics = self.recalculator.recalculate(&code).await?;
        self.publish(CouponEvent::AnalyticsRecalculated { code, analytics: analytics.clone() }).await;
        Ok(analytics)
    }

    /// Order lifecycle hook. Returns the new analytics when the event touched a
    /// coupon's usage; events for coupons that no longer exist are ignored.
    #[instrument(skip(self, event), fields(order_id = %event.order_id()))]
    pub async fn handle_order_event(&self, event: &OrderLifecycleEvent) -> Result<Option<CouponAnalytics>> {
        let Some(code) = event.affected_coupon() else { return Ok(None) };
        match self.recalculate_coupon_analytics(code.as_str()).await {
            Ok(analytics) => Ok(Some(analytics)),
            Err(CouponError::CouponNotFound) => {
                warn!(code = %code, "order references unknown coupon, skipping analytics");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Coupon record with its usability recomputed from the ledger.
    pub async fn coupon_status(&self, code: &str) -> Result<(Coupon, CouponState)> {
        let code = CouponCode::new(code).map_err(|_| CouponError::CouponNotFound)?;
        let coupon = self.store.get_by_code(&code, false).await?.ok_or(CouponError::CouponNotFound)?;
        let used = self.accountant.real_usage_count(&code).await?;
        let state = coupon.state(Utc::now(), used, None);
        Ok((coupon, state))
    }

    pub async fn create_coupon(&self, payload: NewCoupon) -> Result<Coupon> { self.store.create(payload).await }

    pub async fn update_coupon(&self, code: &str, update: UpdateCoupon) -> Result<Coupon> {
        let code = CouponCode::new(code).map_err(|_| CouponError::CouponNotFound)?;
        self.store.update_definition(&code, update).await
    }

    async fn publish(&self, event: CouponEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, "failed to encode coupon event"); return; }
        };
        if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
            warn!(error = %e, subject = event.subject(), "failed to publish coupon event");
        }
    }
}
