//! OpenSASE Coupons
//!
//! Coupon validation and usage accounting for the OpenSASE e-commerce platform.
//!
//! ## Features
//! - Side-effect-free coupon validation (percentage and fixed discounts)
//! - Global and per-user usage caps enforced against order history
//! - Usage recording at payment confirmation, idempotent per order
//! - Usage analytics rebuilt from the order ledger on lifecycle changes

pub mod api;
pub mod config;
pub mod domain;
pub mod ledger;
pub mod services;
pub mod store;

pub use domain::aggregates::{Coupon, CouponAnalytics, CouponState, DiscountType, LedgerOrder, NewCoupon, OrderStatus, UpdateCoupon};
pub use domain::events::{CouponEvent, OrderLifecycleEvent};
pub use domain::value_objects::{CouponCode, CustomerEmail};
pub use ledger::{InMemoryOrderLedger, OrderLedger, OrderQuery, PgOrderLedger};
pub use services::{CouponService, Rejection, Validation};
pub use store::{CouponStore, InMemoryCouponStore, PgCouponStore};

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CouponError {
    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Coupon code already exists")]
    DuplicateCode,

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CouponError>;
