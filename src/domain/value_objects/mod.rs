//! Value Objects for coupon accounting

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coupon code value object.
///
/// Codes are case-insensitive, so the canonical form is trimmed and lowercased.
/// Every lookup, ledger filter and cache key goes through this type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub const MAX_LENGTH: usize = 64;

    pub fn new(value: impl AsRef<str>) -> Result<Self, CouponCodeError> {
        let value = value.as_ref().trim().to_lowercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.chars().count() > Self::MAX_LENGTH { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn matches(&self, raw: &str) -> bool { raw.trim().to_lowercase() == self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Coupon code empty"), Self::TooLong => write!(f, "Coupon code too long") }
    }
}

/// Purchaser identity used for per-user accounting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerEmail(String);

impl CustomerEmail {
    pub fn new(value: impl AsRef<str>) -> Result<Self, EmailError> {
        let value = value.as_ref().trim().to_lowercase();
        if value.is_empty() { return Err(EmailError::Empty); }
        Ok(Self(value))
    }

    /// Blank input counts as "no email supplied".
    pub fn parse_optional(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| Self::new(v).ok())
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn matches(&self, raw: &str) -> bool { raw.trim().to_lowercase() == self.0 }
}

impl fmt::Display for CustomerEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CustomerEmail {
    type Error = EmailError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CustomerEmail> for String {
    fn from(email: CustomerEmail) -> Self { email.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum EmailError { Empty }
impl std::error::Error for EmailError {}
impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Email empty") }
}

/// Rounds a currency amount to cents.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_coupon_code_normalized() { let code = CouponCode::new("  Save10 ").unwrap(); assert_eq!(code.as_str(), "save10"); }
    #[test]
    fn test_coupon_code_rejects_blank() { assert_eq!(CouponCode::new("   "), Err(CouponCodeError::Empty)); }
    #[test]
    fn test_coupon_code_matches_any_casing() { assert!(CouponCode::new("one4me").unwrap().matches(" ONE4ME")); }
    #[test]
    fn test_email_optional_blank_is_none() {
        assert!(CustomerEmail::parse_optional(Some("  ")).is_none());
        assert_eq!(CustomerEmail::parse_optional(Some("A@X.com")).unwrap().as_str(), "a@x.com");
    }
    #[test]
    fn test_round_currency() {
        assert_eq!(round_currency(Decimal::new(10005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_currency(Decimal::new(3333333, 5)), Decimal::new(3333, 2));
    }
}
