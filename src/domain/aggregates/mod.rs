//! Aggregates module
pub mod coupon;
pub mod order;

pub use coupon::{check_discount_rule, Coupon, CouponAnalytics, CouponPatch, CouponState, DiscountType, NewCoupon, UpdateCoupon};
pub use order::{LedgerOrder, OrderStatus, COUPON_CODE_FIELDS, EMAIL_FIELDS};
