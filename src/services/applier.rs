//! Records coupon usage at payment confirmation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument};
use crate::domain::aggregates::CouponPatch;
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use crate::store::CouponStore;
use crate::Result;
use super::accountant::UsageAccountant;
use super::validator::{CouponAction, CouponValidator, Rejection, Validation};

#[derive(Clone, Debug, Default)]
pub struct ApplyRequest {
    pub code: String,
    pub amount: Decimal,
    pub email: Option<String>,
    /// Makes repeated calls for the same order replay instead of recounting.
    pub order_id: Option<String>,
}

#[derive(Clone)]
pub struct CouponApplier {
    store: Arc<dyn CouponStore>,
    accountant: UsageAccountant,
    validator: CouponValidator,
}

impl CouponApplier {
    pub fn new(store: Arc<dyn CouponStore>, accountant: UsageAccountant, validator: CouponValidator) -> Self {
        Self { store, accountant, validator }
    }

    pub async fn apply(&self, request: ApplyRequest) -> Validation {
        self.apply_at(request, Utc::now()).await
    }

    #[instrument(skip(self, request, now), fields(code = %request.code, order_id = ?request.order_id))]
    pub async fn apply_at(&self, request: ApplyRequest, now: DateTime<Utc>) -> Validation {
        match self.try_apply(&request, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "coupon apply failed");
                Validation::Rejected(Rejection::Unavailable { action: CouponAction::Apply })
            }
        }
    }

    async fn try_apply(&self, request: &ApplyRequest, now: DateTime<Utc>) -> Result<Validation> {
        let email = CustomerEmail::parse_optional(request.email.as_deref());
        let order_id = request.order_id.as_deref().map(str::trim).filter(|id| !id.is_empty());

        if let Some(replayed) = self.replay(&request.code, request.amount, order_id, now).await? {
            return Ok(replayed);
        }

        let (discount, coupon) = match self.validator.evaluate(&request.code, request.amount, email.as_ref(), now).await? {
            Validation::Approved { discount, coupon } => (discount, coupon),
            rejected => return Ok(rejected),
        };

        let usage_count = self.accountant.real_usage_count(&coupon.code).await?;
        let mut user_usages = coupon.user_usages.clone().unwrap_or_default();
        if let Some(email) = &email {
            let prior = self.accountant.user_usage_count(&coupon.code, email).await?;
            // Drop differently-cased keys so the entry is stored once.
            user_usages.retain(|k, _| !email.matches(k));
            user_usages.insert(email.to_string(), prior.saturating_add(1));
        }

        let patch = CouponPatch::usage(usage_count, user_usages).with_applied_order(order_id.map(str::to_string));
        let coupon = self.store.update_fields(&coupon.code, patch).await?;
        info!(code = %coupon.code, discount = %discount, usage_count = coupon.usage_count, "coupon usage recorded");
        Ok(Validation::Approved { discount, coupon })
    }

    /// An order that already carries this coupon gets its discount back untouched,
    /// as long as the ledger still counts it: either not persisted yet, or stored
    /// against this code in a status that counts as usage. A cancelled, failed or
    /// recoded order goes through full validation again.
    async fn replay(&self, raw_code: &str, amount: Decimal, order_id: Option<&str>, now: DateTime<Utc>) -> Result<Option<Validation>> {
        let (Some(order_id), Ok(code)) = (order_id, CouponCode::new(raw_code)) else { return Ok(None) };
        let Some(coupon) = self.store.get_by_code(&code, true).await? else { return Ok(None) };
        if !coupon.has_applied_order(order_id) || coupon.is_expired_at(now) {
            return Ok(None);
        }
        if let Some(order) = self.accountant.order(order_id).await? {
            if order.coupon_code.as_ref() != Some(&code) || !order.counts_as_usage() {
                return Ok(None);
            }
        }
        info!(code = %code, order_id, "coupon already applied to order, replaying");
        Ok(Some(Validation::Approved { discount: coupon.discount_for(amount), coupon }))
    }
}
