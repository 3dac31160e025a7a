//! Order ledger query interface
//!
//! The ledger is the source of truth for coupon usage. Implementations must match
//! coupon codes and emails case-insensitively across every stored field synonym
//! (see [`COUPON_CODE_FIELDS`](crate::domain::aggregates::COUPON_CODE_FIELDS) and
//! [`EMAIL_FIELDS`](crate::domain::aggregates::EMAIL_FIELDS)).

mod memory;
mod postgres;

pub use memory::InMemoryOrderLedger;
pub use postgres::PgOrderLedger;

use async_trait::async_trait;
use crate::domain::aggregates::{LedgerOrder, OrderStatus};
use crate::domain::value_objects::{CouponCode, CustomerEmail};
use crate::Result;

/// Filter over orders referencing one coupon.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderQuery {
    pub coupon_code: CouponCode,
    pub email: Option<CustomerEmail>,
    pub status_not_in: Vec<OrderStatus>,
}

impl OrderQuery {
    pub fn for_coupon(code: &CouponCode) -> Self {
        Self { coupon_code: code.clone(), email: None, status_not_in: vec![] }
    }

    pub fn by_email(mut self, email: &CustomerEmail) -> Self { self.email = Some(email.clone()); self }

    /// Restricts to orders that count as coupon usage.
    pub fn counted_usage(mut self) -> Self { self.status_not_in = OrderStatus::NOT_COUNTED.to_vec(); self }

    pub fn matches(&self, order: &LedgerOrder) -> bool {
        order.coupon_code.as_ref() == Some(&self.coupon_code)
            && self.email.as_ref().map_or(true, |email| order.email.as_ref() == Some(email))
            && !self.status_not_in.contains(&order.status)
    }

    /// Every stored spelling of the excluded statuses.
    pub(crate) fn excluded_spellings(&self) -> Vec<String> {
        self.status_not_in.iter().flat_map(|s| s.stored_spellings()).map(str::to_string).collect()
    }
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<LedgerOrder>>;

    /// One order by id, whatever its coupon or status.
    async fn find_order(&self, order_id: &str) -> Result<Option<LedgerOrder>>;

    async fn count_orders(&self, query: &OrderQuery) -> Result<u64> {
        Ok(self.find_orders(query).await?.len() as u64)
    }
}
