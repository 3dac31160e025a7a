use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use validator::Validate;
use crate::domain::aggregates::{Coupon, CouponPatch, NewCoupon, UpdateCoupon};
use crate::domain::value_objects::CouponCode;
use crate::{CouponError, Result};
use super::CouponStore;

#[derive(Clone, Default)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<CouponCode, Coupon>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self { Self::default() }

    /// Seeds a fully formed record, bypassing admin validation.
    pub async fn insert(&self, coupon: Coupon) {
        self.coupons.write().await.insert(coupon.code.clone(), coupon);
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn get_by_code(&self, code: &CouponCode, active_only: bool) -> Result<Option<Coupon>> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(code).filter(|c| !active_only || c.active).cloned())
    }

    async fn create(&self, coupon: NewCoupon) -> Result<Coupon> {
        coupon.validate().map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        let code = CouponCode::new(&coupon.code).map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&code) { return Err(CouponError::DuplicateCode); }
        let coupon = coupon.into_coupon(code.clone());
        coupons.insert(code, coupon.clone());
        Ok(coupon)
    }

    async fn update_definition(&self, code: &CouponCode, update: UpdateCoupon) -> Result<Coupon> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons.get_mut(code).ok_or(CouponError::CouponNotFound)?;
        coupon.apply_definition(update).map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        Ok(coupon.clone())
    }

    async fn update_fields(&self, code: &CouponCode, patch: CouponPatch) -> Result<Coupon> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons.get_mut(code).ok_or(CouponError::CouponNotFound)?;
        coupon.apply_patch(patch);
        Ok(coupon.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountType;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn new_coupon(code: &str) -> NewCoupon {
        NewCoupon {
            code: code.into(), discount_type: DiscountType::Percentage, discount_value: Decimal::new(10, 0),
            active: true, expires_at: None, max_uses: None, max_usage_per_user: 0,
        }
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive_and_filters_inactive() {
        let store = InMemoryCouponStore::new();
        store.create(new_coupon("Save10")).await.unwrap();
        let code = CouponCode::new("SAVE10").unwrap();
        assert!(store.get_by_code(&code, true).await.unwrap().is_some());

        let update = UpdateCoupon { active: Some(false), ..UpdateCoupon::default() };
        store.update_definition(&code, update).await.unwrap();
        assert!(store.get_by_code(&code, true).await.unwrap().is_none());
        assert!(store.get_by_code(&code, false).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = InMemoryCouponStore::new();
        store.create(new_coupon("dup")).await.unwrap();
        assert!(matches!(store.create(new_coupon(" DUP ")).await, Err(CouponError::DuplicateCode)));
    }

    #[tokio::test]
    async fn test_usage_patch_overwrites() {
        let store = InMemoryCouponStore::new();
        store.create(new_coupon("p")).await.unwrap();
        let code = CouponCode::new("p").unwrap();
        let patch = CouponPatch::usage(3, BTreeMap::from([("a@x.com".to_string(), 3)])).with_applied_order(Some("o1".into()));
        let updated = store.update_fields(&code, patch).await.unwrap();
        assert_eq!(updated.usage_count, 3);
        assert!(updated.has_applied_order("o1"));
        let missing = CouponCode::new("nope").unwrap();
        assert!(matches!(store.update_fields(&missing, CouponPatch::default()).await, Err(CouponError::CouponNotFound)));
    }
}
