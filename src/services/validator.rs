//! Coupon eligibility checks.
//!
//! Validation never writes. The preview path and the apply path both run
//! [`CouponValidator::evaluate`], so a coupon accepted at preview time is checked
//! again, in full, at payment confirmation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use crate::store::CouponStore;
use crate::Result;
use super::accountant::UsageAccountant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponAction { Validate, Apply }

/// Why a coupon cannot be used. Each variant asks the shopper for something different.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NotFound { code: String },
    Expired { expired_at: DateTime<Utc> },
    EmailRequired,
    PerUserLimitExceeded { used: u32, max: u32 },
    GlobalLimitExceeded { used: u32, max: u32 },
    Unavailable { action: CouponAction },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { code } => write!(f, "Coupon '{code}' not found or not active."),
            Self::Expired { .. } => write!(f, "This coupon has expired."),
            Self::EmailRequired => write!(f, "This coupon requires an email address."),
            Self::PerUserLimitExceeded { used, max } => write!(f, "You have reached the usage limit for this coupon ({used}/{max})."),
            Self::GlobalLimitExceeded { used, max } => write!(f, "This coupon has reached its maximum number of uses ({used}/{max})."),
            Self::Unavailable { action: CouponAction::Validate } => write!(f, "Error validating coupon."),
            Self::Unavailable { action: CouponAction::Apply } => write!(f, "Error applying coupon."),
        }
    }
}

/// Outcome shared by validate and apply.
#[derive(Clone, Debug, PartialEq)]
pub enum Validation {
    Approved { discount: Decimal, coupon: Coupon },
    Rejected(Rejection),
}

impl Validation {
    pub fn is_approved(&self) -> bool { matches!(self, Self::Approved { .. }) }

    /// Zero when rejected.
    pub fn discount(&self) -> Decimal {
        match self { Self::Approved { discount, .. } => *discount, Self::Rejected(_) => Decimal::ZERO }
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        match self { Self::Approved { coupon, .. } => Some(coupon), Self::Rejected(_) => None }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self { Self::Rejected(r) => Some(r), Self::Approved { .. } => None }
    }

    pub fn into_parts(self) -> (Decimal, Option<Coupon>, Option<Rejection>) {
        match self {
            Self::Approved { discount, coupon } => (discount, Some(coupon), None),
            Self::Rejected(r) => (Decimal::ZERO, None, Some(r)),
        }
    }
}

#[derive(Clone)]
pub struct CouponValidator {
    store: Arc<dyn CouponStore>,
    accountant: UsageAccountant,
}

impl CouponValidator {
    pub fn new(store: Arc<dyn CouponStore>, accountant: UsageAccountant) -> Self { Self { store, accountant } }

    pub async fn validate(&self, code: &str, amount: Decimal, email: Option<&str>) -> Validation {
        self.validate_at(code, amount, email, Utc::now()).await
    }

    #[instrument(skip(self, email, now), fields(code = %code, amount = %amount))]
    pub async fn validate_at(&self, code: &str, amount: Decimal, email: Option<&str>, now: DateTime<Utc>) -> Validation {
        let email = CustomerEmail::parse_optional(email);
        match self.evaluate(code, amount, email.as_ref(), now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "coupon validation failed");
                Validation::Rejected(Rejection::Unavailable { action: CouponAction::Validate })
            }
        }
    }

    /// Eligibility checks in order, stopping at the first failure. `Err` only for
    /// storage or ledger failures.
    pub(crate) async fn evaluate(&self, raw_code: &str, amount: Decimal, email: Option<&CustomerEmail>, now: DateTime<Utc>) -> Result<Validation> {
        let not_found = || Validation::Rejected(Rejection::NotFound { code: raw_code.trim().to_string() });
        let Ok(code) = CouponCode::new(raw_code) else { return Ok(not_found()) };
        let Some(coupon) = self.store.get_by_code(&code, true).await? else {
            debug!(code = %code, "coupon not found or inactive");
            return Ok(not_found());
        };

        if let Some(expired_at) = coupon.expires_at.filter(|_| coupon.is_expired_at(now)) {
            return Ok(Validation::Rejected(Rejection::Expired { expired_at }));
        }

        // Per-user before global: it is the more specific failure.
        if let Some(max) = coupon.per_user_limit() {
            let Some(email) = email else { return Ok(Validation::Rejected(Rejection::EmailRequired)) };
            let used = match coupon.cached_user_usage(email) {
                Some(cached) => cached,
                None => self.accountant.user_usage_count(&code, email).await?,
            };
            if used >= max {
                debug!(code = %code, used, max, "per-user limit reached");
                return Ok(Validation::Rejected(Rejection::PerUserLimitExceeded { used, max }));
            }
        }

        if let Some(max) = coupon.global_limit() {
            let used = self.accountant.real_usage_count(&code).await?;
            if used >= max {
                debug!(code = %code, used, max, "global limit reached");
                return Ok(Validation::Rejected(Rejection::GlobalLimitExceeded { used, max }));
            }
        }

        let discount = coupon.discount_for(amount);
        Ok(Validation::Approved { discount, coupon })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DiscountType, NewCoupon};
    use crate::ledger::{InMemoryOrderLedger, OrderLedger, OrderQuery};
    use crate::store::InMemoryCouponStore;
    use crate::domain::aggregates::LedgerOrder;
    use crate::CouponError;
    use async_trait::async_trait;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn coupon(code: &str, discount_type: DiscountType, value: i64) -> Coupon {
        NewCoupon {
            code: code.into(), discount_type, discount_value: Decimal::new(value, 0), active: true,
            expires_at: None, max_uses: None, max_usage_per_user: 0,
        }.into_coupon(CouponCode::new(code).unwrap())
    }

    async fn validator_with(coupons: Vec<Coupon>, ledger: InMemoryOrderLedger) -> CouponValidator {
        let store = InMemoryCouponStore::new();
        for c in coupons { store.insert(c).await; }
        CouponValidator::new(Arc::new(store), UsageAccountant::new(Arc::new(ledger)))
    }

    #[tokio::test]
    async fn test_percentage_without_email() {
        let v = validator_with(vec![coupon("SAVE10", DiscountType::Percentage, 10)], InMemoryOrderLedger::new()).await;
        let outcome = v.validate("  save10 ", Decimal::new(10000, 2), None).await;
        assert_eq!(outcome.discount(), Decimal::new(1000, 2));
        assert_eq!(outcome.coupon().unwrap().code.as_str(), "save10");
    }

    #[tokio::test]
    async fn test_not_found_and_inactive() {
        let mut inactive = coupon("OFF", DiscountType::Fixed, 5);
        inactive.active = false;
        let v = validator_with(vec![inactive], InMemoryOrderLedger::new()).await;
        let outcome = v.validate("GONE", Decimal::new(100, 0), None).await;
        assert_eq!(outcome.rejection(), Some(&Rejection::NotFound { code: "GONE".into() }));
        assert!(outcome.rejection().unwrap().to_string().ends_with("not found or not active."));
        assert!(!v.validate("off", Decimal::new(100, 0), None).await.is_approved());
        assert!(!v.validate("   ", Decimal::new(100, 0), None).await.is_approved());
    }

    #[tokio::test]
    async fn test_expired_regardless_of_usage() {
        let now = Utc::now();
        let mut old = coupon("OLDONE", DiscountType::Fixed, 5);
        old.expires_at = Some(now - Duration::days(1));
        old.max_usage_per_user = 1;
        let v = validator_with(vec![old], InMemoryOrderLedger::new()).await;
        let outcome = v.validate_at("OLDONE", Decimal::new(20, 0), None, now).await;
        assert!(matches!(outcome.rejection(), Some(Rejection::Expired { .. })));
    }

    #[tokio::test]
    async fn test_expiry_equal_to_now_is_expired() {
        let now = Utc::now();
        let mut c = coupon("EDGE", DiscountType::Fixed, 5);
        c.expires_at = Some(now);
        let v = validator_with(vec![c], InMemoryOrderLedger::new()).await;
        assert!(!v.validate_at("EDGE", Decimal::new(20, 0), None, now).await.is_approved());
        assert!(v.validate_at("EDGE", Decimal::new(20, 0), None, now - Duration::milliseconds(1)).await.is_approved());
    }

    #[tokio::test]
    async fn test_per_user_cap_requires_email() {
        let mut c = coupon("ONE4ME", DiscountType::Fixed, 5);
        c.max_usage_per_user = 1;
        let v = validator_with(vec![c], InMemoryOrderLedger::new()).await;
        assert_eq!(v.validate("ONE4ME", Decimal::new(20, 0), None).await.rejection(), Some(&Rejection::EmailRequired));
        assert_eq!(v.validate("ONE4ME", Decimal::new(20, 0), Some(" ")).await.rejection(), Some(&Rejection::EmailRequired));
        assert!(v.validate("ONE4ME", Decimal::new(20, 0), Some("a@x.com")).await.is_approved());
    }

    #[tokio::test]
    async fn test_per_user_cap_boundary_is_inclusive() {
        let ledger = InMemoryOrderLedger::new();
        ledger.insert("o1", json!({"couponCode": "ONE4ME", "userEmail": "A@X.com", "status": "completed"})).await;
        let mut c = coupon("ONE4ME", DiscountType::Fixed, 5);
        c.max_usage_per_user = 1;
        let v = validator_with(vec![c], ledger).await;
        let outcome = v.validate("one4me", Decimal::new(20, 0), Some("a@x.com")).await;
        assert_eq!(outcome.rejection(), Some(&Rejection::PerUserLimitExceeded { used: 1, max: 1 }));
        assert!(outcome.rejection().unwrap().to_string().contains("(1/1)"));
        assert!(v.validate("one4me", Decimal::new(20, 0), Some("b@x.com")).await.is_approved());
    }

    #[tokio::test]
    async fn test_cached_user_usage_preferred_over_ledger() {
        let mut c = coupon("CACHED", DiscountType::Fixed, 5);
        c.max_usage_per_user = 2;
        c.user_usages = Some(BTreeMap::from([("a@x.com".to_string(), 2)]));
        let v = validator_with(vec![c], InMemoryOrderLedger::new()).await;
        let outcome = v.validate("CACHED", Decimal::new(20, 0), Some("A@x.com")).await;
        assert_eq!(outcome.rejection(), Some(&Rejection::PerUserLimitExceeded { used: 2, max: 2 }));
    }

    #[tokio::test]
    async fn test_global_cap_ignores_stale_cache() {
        let ledger = InMemoryOrderLedger::new();
        ledger.insert("o1", json!({"couponCode": "CAPPED", "email": "a@x.com", "status": "completed"})).await;
        ledger.insert("o2", json!({"coupon_code": "capped", "email": "b@x.com", "status": "pending"})).await;
        let mut c = coupon("CAPPED", DiscountType::Fixed, 5);
        c.max_uses = Some(2);
        c.usage_count = 0;
        let v = validator_with(vec![c], ledger).await;
        let outcome = v.validate("CAPPED", Decimal::new(20, 0), Some("c@x.com")).await;
        assert_eq!(outcome.rejection(), Some(&Rejection::GlobalLimitExceeded { used: 2, max: 2 }));
        assert!(outcome.rejection().unwrap().to_string().contains("(2/2)"));
    }

    #[tokio::test]
    async fn test_per_user_checked_before_global() {
        let ledger = InMemoryOrderLedger::new();
        ledger.insert("o1", json!({"couponCode": "BOTH", "email": "a@x.com", "status": "completed"})).await;
        let mut c = coupon("BOTH", DiscountType::Fixed, 5);
        c.max_uses = Some(1);
        c.max_usage_per_user = 1;
        let v = validator_with(vec![c], ledger).await;
        let outcome = v.validate("BOTH", Decimal::new(20, 0), Some("a@x.com")).await;
        assert!(matches!(outcome.rejection(), Some(Rejection::PerUserLimitExceeded { .. })));
    }

    #[tokio::test]
    async fn test_unlimited_caps_ignore_history() {
        let ledger = InMemoryOrderLedger::new();
        for i in 0..5 {
            ledger.insert(format!("o{i}"), json!({"couponCode": "FREE", "email": "a@x.com", "status": "completed"})).await;
        }
        let mut c = coupon("FREE", DiscountType::Fixed, 5);
        c.max_uses = Some(0);
        let v = validator_with(vec![c], ledger).await;
        assert!(v.validate("FREE", Decimal::new(20, 0), None).await.is_approved());
    }

    #[tokio::test]
    async fn test_fixed_discount_capped() {
        let v = validator_with(vec![coupon("FLAT50", DiscountType::Fixed, 50)], InMemoryOrderLedger::new()).await;
        assert_eq!(v.validate("FLAT50", Decimal::new(3000, 2), None).await.discount(), Decimal::new(3000, 2));
    }

    struct BrokenLedger;

    #[async_trait]
    impl OrderLedger for BrokenLedger {
        async fn find_orders(&self, _query: &OrderQuery) -> crate::Result<Vec<LedgerOrder>> {
            Err(CouponError::LedgerError("connection reset".into()))
        }

        async fn find_order(&self, _order_id: &str) -> crate::Result<Option<LedgerOrder>> {
            Err(CouponError::LedgerError("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_becomes_rejection() {
        let store = InMemoryCouponStore::new();
        let mut c = coupon("CAPPED", DiscountType::Fixed, 5);
        c.max_uses = Some(3);
        store.insert(c).await;
        let v = CouponValidator::new(Arc::new(store), UsageAccountant::new(Arc::new(BrokenLedger)));
        let outcome = v.validate("CAPPED", Decimal::new(20, 0), None).await;
        assert_eq!(outcome.rejection(), Some(&Rejection::Unavailable { action: CouponAction::Validate }));
        assert_eq!(outcome.rejection().unwrap().to_string(), "Error validating coupon.");
    }
}
