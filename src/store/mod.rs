//! Coupon record store

mod memory;
mod postgres;

pub use memory::InMemoryCouponStore;
pub use postgres::PgCouponStore;

use async_trait::async_trait;
use crate::domain::aggregates::{Coupon, CouponPatch, NewCoupon, UpdateCoupon};
use crate::domain::value_objects::CouponCode;
use crate::Result;

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Case-insensitive lookup; `active_only` hides deactivated coupons.
    async fn get_by_code(&self, code: &CouponCode, active_only: bool) -> Result<Option<Coupon>>;

    async fn create(&self, coupon: NewCoupon) -> Result<Coupon>;

    /// Admin edit of the definition fields.
    async fn update_definition(&self, code: &CouponCode, update: UpdateCoupon) -> Result<Coupon>;

    /// Overwrites usage-cache fields present in the patch.
    async fn update_fields(&self, code: &CouponCode, patch: CouponPatch) -> Result<Coupon>;
}
