//! Order ledger view
//!
//! Orders belong to the checkout flow; this crate only reads the coupon, email,
//! status and amount fields. Historic documents store those fields under several
//! names, so every document is normalized here before any accounting logic sees it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use crate::domain::value_objects::{CouponCode, CustomerEmail};

/// Keys a coupon code has been stored under, in lookup priority order.
pub const COUPON_CODE_FIELDS: [&str; 2] = ["couponCode", "coupon_code"];
/// Keys a purchaser email has been stored under, in lookup priority order.
pub const EMAIL_FIELDS: [&str; 3] = ["email", "userEmail", "customerEmail"];
const STATUS_FIELDS: [&str; 1] = ["status"];
const DISCOUNT_FIELDS: [&str; 2] = ["discountAmount", "discount_amount"];
const ORIGINAL_TOTAL_FIELDS: [&str; 2] = ["originalTotal", "original_total"];
const TOTAL_FIELDS: [&str; 1] = ["total"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
    AwaitingStock,
    PartiallyFulfilled,
    Other(String),
}

impl OrderStatus {
    /// Statuses that never count toward coupon usage.
    pub const NOT_COUNTED: [OrderStatus; 2] = [OrderStatus::Cancelled, OrderStatus::Failed];

    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "" | "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            "failed" => Self::Failed,
            "awaiting_stock" => Self::AwaitingStock,
            "partially_fulfilled" => Self::PartiallyFulfilled,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::AwaitingStock => "awaiting_stock",
            Self::PartiallyFulfilled => "partially_fulfilled",
            Self::Other(s) => s,
        }
    }

    /// Stored spellings that parse to this status.
    pub fn stored_spellings(&self) -> Vec<&str> {
        match self {
            Self::Cancelled => vec!["cancelled", "canceled"],
            other => vec![other.as_str()],
        }
    }

    /// The single "this coupon was used" predicate shared by the accountant and the
    /// analytics recalculator. Statuses outside the known set count, so an
    /// unrecognized state can never free up a capped coupon.
    pub fn counts_as_usage(&self) -> bool {
        !Self::NOT_COUNTED.contains(self)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self { Self::parse(&raw) }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self { status.as_str().to_string() }
}

/// Canonical view of an order document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerOrder {
    pub id: String,
    pub coupon_code: Option<CouponCode>,
    pub email: Option<CustomerEmail>,
    pub status: OrderStatus,
    pub discount_amount: Option<Decimal>,
    pub original_total: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl LedgerOrder {
    /// Maps a raw order document onto the canonical field set.
    pub fn from_document(id: impl Into<String>, document: &Value) -> Self {
        Self {
            id: id.into(),
            coupon_code: first_text(document, &COUPON_CODE_FIELDS).and_then(|c| CouponCode::new(c).ok()),
            email: first_text(document, &EMAIL_FIELDS).and_then(|e| CustomerEmail::new(e).ok()),
            status: first_text(document, &STATUS_FIELDS).map(OrderStatus::parse).unwrap_or_default(),
            discount_amount: first_decimal(document, &DISCOUNT_FIELDS),
            original_total: first_decimal(document, &ORIGINAL_TOTAL_FIELDS),
            total: first_decimal(document, &TOTAL_FIELDS),
        }
    }

    pub fn counts_as_usage(&self) -> bool { self.status.counts_as_usage() }
}

fn first_text<'a>(document: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| document.get(*k).and_then(Value::as_str))
        .find(|v| !v.trim().is_empty())
}

fn first_decimal(document: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().filter_map(|k| document.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
