//! Domain events
use crate::domain::aggregates::{CouponAnalytics, OrderStatus};
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order lifecycle notifications from the checkout flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OrderLifecycleEvent {
    Created { order_id: String, coupon_code: Option<CouponCode>, status: OrderStatus },
    StatusChanged { order_id: String, coupon_code: Option<CouponCode>, from: OrderStatus, to: OrderStatus },
    Deleted { order_id: String, coupon_code: Option<CouponCode> },
}

impl OrderLifecycleEvent {
    pub fn order_id(&self) -> &str {
        match self {
            Self::Created { order_id, .. } | Self::StatusChanged { order_id, .. } | Self::Deleted { order_id, .. } => order_id,
        }
    }

    /// Coupon whose usage or analytics this event can change, if any. Every real
    /// status move shifts a bucket, so only no-op patches are skipped.
    pub fn affected_coupon(&self) -> Option<&CouponCode> {
        match self {
            Self::Created { coupon_code, .. } | Self::Deleted { coupon_code, .. } => coupon_code.as_ref(),
            Self::StatusChanged { coupon_code, from, to, .. } => coupon_code.as_ref().filter(|_| from != to),
        }
    }
}

/// Events published after coupon state changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CouponEvent {
    UsageApplied { code: CouponCode, email: Option<CustomerEmail>, order_id: Option<String>, discount: Decimal, usage_count: u32 },
    AnalyticsRecalculated { code: CouponCode, analytics: CouponAnalytics },
}

impl CouponEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::UsageApplied { .. } => "coupons.usage.applied",
            Self::AnalyticsRecalculated { .. } => "coupons.analytics.recalculated",
        }
    }
}
