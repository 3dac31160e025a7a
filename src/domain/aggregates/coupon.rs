//! Coupon Aggregate

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::value_objects::{round_currency, CouponCode, CustomerEmail};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[serde(alias = "percent")]
    Percentage,
    #[serde(alias = "fixed_amount")]
    Fixed,
}

/// Coupon definition plus its denormalized usage cache.
///
/// `usage_count` and `user_usages` are a read cache of the order ledger. They are
/// only ever rewritten through [`CouponPatch`], which the applier and the analytics
/// recalculator build from a fresh ledger scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub active: bool,
    #[serde(default, deserialize_with = "lenient_utc::deserialize")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub max_usage_per_user: u32,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub user_usages: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing)]
    pub applied_orders: BTreeSet<String>,
    #[serde(default)]
    pub analytics: Option<CouponAnalytics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usability of a coupon, derived on demand and never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponState {
    ActiveAvailable,
    ActiveExhausted,
    Expired,
    Inactive,
}

impl Coupon {
    /// A coupon whose expiry equals `now` is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Global cap; `None` when unlimited (absent or zero).
    pub fn global_limit(&self) -> Option<u32> { self.max_uses.filter(|max| *max > 0) }

    /// Per-user cap; `None` when unlimited (zero).
    pub fn per_user_limit(&self) -> Option<u32> { Some(self.max_usage_per_user).filter(|max| *max > 0) }

    /// Cached per-user count, matching stored keys case-insensitively.
    pub fn cached_user_usage(&self, email: &CustomerEmail) -> Option<u32> {
        let usages = self.user_usages.as_ref()?;
        usages.get(email.as_str()).copied()
            .or_else(|| usages.iter().find(|(k, _)| email.matches(k)).map(|(_, v)| *v))
    }

    pub fn discount_for(&self, amount: Decimal) -> Decimal {
        let amount = amount.max(Decimal::ZERO);
        let discount = match self.discount_type {
            DiscountType::Percentage => amount * self.discount_value / Decimal::ONE_HUNDRED,
            DiscountType::Fixed => self.discount_value.min(amount),
        };
        round_currency(discount.max(Decimal::ZERO))
    }

    pub fn state(&self, now: DateTime<Utc>, real_usage: u32, user_usage: Option<u32>) -> CouponState {
        if !self.active { return CouponState::Inactive; }
        if self.is_expired_at(now) { return CouponState::Expired; }
        let user_exhausted = matches!((self.per_user_limit(), user_usage), (Some(max), Some(used)) if used >= max);
        let global_exhausted = self.global_limit().is_some_and(|max| real_usage >= max);
        if user_exhausted || global_exhausted { CouponState::ActiveExhausted } else { CouponState::ActiveAvailable }
    }

    pub fn has_applied_order(&self, order_id: &str) -> bool { self.applied_orders.contains(order_id) }

    /// Applies an admin edit. Usage fields are not reachable from here.
    pub fn apply_definition(&mut self, update: UpdateCoupon) -> Result<(), ValidationError> {
        let discount_type = update.discount_type.unwrap_or(self.discount_type);
        let discount_value = update.discount_value.unwrap_or(self.discount_value);
        check_discount_rule(discount_type, discount_value)?;
        self.discount_type = discount_type;
        self.discount_value = discount_value;
        if let Some(active) = update.active { self.active = active; }
        if update.clear_expiry { self.expires_at = None; }
        if let Some(expires_at) = update.expires_at { self.expires_at = Some(expires_at); }
        if let Some(max_uses) = update.max_uses { self.max_uses = Some(max_uses); }
        if let Some(max) = update.max_usage_per_user { self.max_usage_per_user = max; }
        self.touch();
        Ok(())
    }

    pub(crate) fn apply_patch(&mut self, patch: CouponPatch) {
        if let Some(count) = patch.usage_count { self.usage_count = count; }
        if let Some(usages) = patch.user_usages { self.user_usages = Some(usages); }
        if let Some(counted) = &patch.counted_orders { self.applied_orders.retain(|id| counted.contains(id)); }
        if let Some(order_id) = patch.applied_order { self.applied_orders.insert(order_id); }
        if let Some(analytics) = patch.analytics { self.analytics = Some(analytics); }
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Payload for creating a coupon.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_new_coupon"))]
pub struct NewCoupon {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, deserialize_with = "lenient_utc::deserialize")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub max_usage_per_user: u32,
}

fn default_active() -> bool { true }

impl NewCoupon {
    pub fn into_coupon(self, code: CouponCode) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::now_v7(), code, discount_type: self.discount_type, discount_value: self.discount_value,
            active: self.active, expires_at: self.expires_at, max_uses: self.max_uses,
            max_usage_per_user: self.max_usage_per_user, usage_count: 0, user_usages: None,
            applied_orders: BTreeSet::new(), analytics: None, created_at: now, updated_at: now,
        }
    }
}

fn validate_new_coupon(coupon: &NewCoupon) -> Result<(), ValidationError> {
    check_discount_rule(coupon.discount_type, coupon.discount_value)
}

/// Admin edit of a coupon definition.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCoupon {
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "lenient_utc::deserialize")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_expiry: bool,
    pub max_uses: Option<u32>,
    pub max_usage_per_user: Option<u32>,
}

pub fn check_discount_rule(discount_type: DiscountType, value: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative_discount"));
    }
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage_out_of_range"));
    }
    Ok(())
}

/// Usage-cache rewrite, built only by the applier and the analytics recalculator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CouponPatch {
    pub(crate) usage_count: Option<u32>,
    pub(crate) user_usages: Option<BTreeMap<String, u32>>,
    pub(crate) applied_order: Option<String>,
    pub(crate) counted_orders: Option<BTreeSet<String>>,
    pub(crate) analytics: Option<CouponAnalytics>,
}

impl CouponPatch {
    pub(crate) fn usage(usage_count: u32, user_usages: BTreeMap<String, u32>) -> Self {
        Self { usage_count: Some(usage_count), user_usages: Some(user_usages), ..Self::default() }
    }
    pub(crate) fn with_applied_order(mut self, order_id: Option<String>) -> Self { self.applied_order = order_id; self }
    pub(crate) fn with_analytics(mut self, analytics: CouponAnalytics) -> Self { self.analytics = Some(analytics); self }
    /// Keeps only applied order ids that still count as usage in the ledger.
    pub(crate) fn retaining_orders(mut self, counted: BTreeSet<String>) -> Self { self.counted_orders = Some(counted); self }

    pub fn usage_count(&self) -> Option<u32> { self.usage_count }
    pub fn user_usages(&self) -> Option<&BTreeMap<String, u32>> { self.user_usages.as_ref() }
    pub fn applied_order(&self) -> Option<&str> { self.applied_order.as_deref() }
    pub fn counted_orders(&self) -> Option<&BTreeSet<String>> { self.counted_orders.as_ref() }
    pub fn analytics(&self) -> Option<&CouponAnalytics> { self.analytics.as_ref() }
}

/// Per-coupon usage breakdown rebuilt from the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponAnalytics {
    pub total: u32,
    pub completed: u32,
    pub cancelled: u32,
    pub pending: u32,
    pub processing: u32,
    pub awaiting_stock: u32,
    pub failed: u32,
    pub partially_fulfilled: u32,
    pub other: u32,
    pub user_usages: BTreeMap<String, u32>,
    pub usage_count: u32,
}

/// Timestamps without an offset are read as UTC.
pub mod lenient_utc {
    use super::*;
    use serde::Deserializer;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.filter(|s| !s.trim().is_empty())
            .map(|s| parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let raw = raw.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| Utc.from_utc_datetime(&n)))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|n| Utc.from_utc_datetime(&n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        NewCoupon {
            code: "TEST".into(), discount_type, discount_value: Decimal::new(value, 0), active: true,
            expires_at: None, max_uses: None, max_usage_per_user: 0,
        }.into_coupon(CouponCode::new("TEST").unwrap())
    }

    #[test]
    fn test_percentage_discount() {
        let c = coupon(DiscountType::Percentage, 10);
        assert_eq!(c.discount_for(Decimal::new(10000, 2)), Decimal::new(1000, 2));
        assert_eq!(c.discount_for(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(c.discount_for(Decimal::new(3333, 2)), Decimal::new(333, 2));
    }

    #[test]
    fn test_fixed_discount_capped_at_amount() {
        let c = coupon(DiscountType::Fixed, 50);
        assert_eq!(c.discount_for(Decimal::new(3000, 2)), Decimal::new(3000, 2));
        assert_eq!(c.discount_for(Decimal::new(8000, 2)), Decimal::new(50, 0));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 5);
        c.expires_at = Some(now);
        assert!(c.is_expired_at(now));
        c.expires_at = Some(now + Duration::seconds(1));
        assert!(!c.is_expired_at(now));
    }

    #[test]
    fn test_zero_caps_mean_unlimited() {
        let mut c = coupon(DiscountType::Fixed, 5);
        c.max_uses = Some(0);
        assert_eq!(c.global_limit(), None);
        assert_eq!(c.per_user_limit(), None);
        assert_eq!(c.state(Utc::now(), 1_000, Some(1_000)), CouponState::ActiveAvailable);
    }

    #[test]
    fn test_state_machine() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 5);
        c.max_uses = Some(2);
        assert_eq!(c.state(now, 1, None), CouponState::ActiveAvailable);
        assert_eq!(c.state(now, 2, None), CouponState::ActiveExhausted);
        c.expires_at = Some(now - Duration::days(1));
        assert_eq!(c.state(now, 0, None), CouponState::Expired);
        c.active = false;
        assert_eq!(c.state(now, 0, None), CouponState::Inactive);
    }

    #[test]
    fn test_cached_user_usage_case_insensitive() {
        let mut c = coupon(DiscountType::Fixed, 5);
        assert_eq!(c.cached_user_usage(&CustomerEmail::new("a@x.com").unwrap()), None);
        c.user_usages = Some(BTreeMap::from([("A@X.com".to_string(), 2)]));
        assert_eq!(c.cached_user_usage(&CustomerEmail::new("a@x.COM").unwrap()), Some(2));
    }

    #[test]
    fn test_new_coupon_validation() {
        let mut payload = NewCoupon {
            code: "BIG".into(), discount_type: DiscountType::Percentage, discount_value: Decimal::new(150, 0),
            active: true, expires_at: None, max_uses: None, max_usage_per_user: 0,
        };
        assert!(payload.validate().is_err());
        payload.discount_value = Decimal::new(100, 0);
        assert!(payload.validate().is_ok());
        payload.code = String::new();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_definition_update_rejects_bad_percentage() {
        let mut c = coupon(DiscountType::Fixed, 500);
        let update = UpdateCoupon { discount_type: Some(DiscountType::Percentage), ..UpdateCoupon::default() };
        assert!(c.apply_definition(update).is_err());
        assert_eq!(c.discount_type, DiscountType::Fixed);
    }

    #[test]
    fn test_naive_timestamp_read_as_utc() {
        let parsed = lenient_utc::parse("2024-03-01T12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let parsed = lenient_utc::parse("2024-03-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }
}
