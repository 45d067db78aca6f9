//! Value Objects for the storefront

use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("phone regex"));
static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Invalid phone number")]
    InvalidPhone,
    #[error("Invalid discount code")]
    InvalidDiscountCode,
    #[error("Quantity must be a positive whole number")]
    InvalidQuantity,
    #[error("Invalid size {0}. Sizes must be S, M, L, or XL.")]
    InvalidSize(String),
    #[error("Invalid background color format. Use a hex code (e.g., #FFFFFF)")]
    InvalidColor,
}

/// Contact email as typed by the customer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let value = value.trim();
        if !EMAIL_RE.is_match(value) { return Err(ValueError::InvalidEmail); }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    /// Lower-cased form used as the owner key of discount codes and accounts.
    pub fn normalized(&self) -> String { self.0.to_lowercase() }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let value = value.trim();
        if !PHONE_RE.is_match(value) { return Err(ValueError::InvalidPhone); }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

/// Discount code, always trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountCodeValue(String);

impl DiscountCodeValue {
    pub const GENERATED_LEN: usize = 8;

    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let value = value.trim().to_uppercase();
        if value.is_empty() || value.len() > 64 { return Err(ValueError::InvalidDiscountCode); }
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::GENERATED_LEN)
            .map(|c| char::from(c).to_ascii_uppercase())
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DiscountCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Quantity value object (strictly positive)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const MAX: u32 = 10_000;

    pub fn new(value: i64) -> Result<Self, ValueError> {
        if value <= 0 || value > i64::from(Self::MAX) { return Err(ValueError::InvalidQuantity); }
        Ok(Self(value as u32))
    }
    pub fn value(&self) -> u32 { self.0 }
    /// Bounded by `MAX`, so always representable as a stock delta.
    pub fn as_i32(&self) -> i32 { self.0 as i32 }
    pub fn as_decimal(&self) -> Decimal { Decimal::from(self.0) }
}

/// Size variants a product may stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Size { S, M, L, XL }

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self { Self::S => "S", Self::M => "M", Self::L => "L", Self::XL => "XL" }
    }
}

impl FromStr for Size {
    type Err = ValueError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::XL),
            _ => Err(ValueError::InvalidSize(s.trim().to_string())),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexColor(String);

impl HexColor {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        if !HEX_COLOR_RE.is_match(value) { return Err(ValueError::InvalidColor); }
        Ok(Self(value.to_uppercase()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for HexColor { fn default() -> Self { Self("#FFFFFF".to_string()) } }

/// Rounds a currency amount to two places, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(Email::parse("a@x.com").is_ok());
        assert_eq!(Email::parse(" A@X.com ").unwrap().normalized(), "a@x.com");
        assert_eq!(Email::parse("a@x"), Err(ValueError::InvalidEmail));
        assert_eq!(Email::parse("a b@x.com"), Err(ValueError::InvalidEmail));
    }

    #[test]
    fn test_phone() {
        assert!(PhoneNumber::parse("+923001234567").is_ok());
        assert!(PhoneNumber::parse("0300123456").is_ok());
        assert_eq!(PhoneNumber::parse("12345"), Err(ValueError::InvalidPhone));
        assert_eq!(PhoneNumber::parse("+92-300-1234567"), Err(ValueError::InvalidPhone));
        assert_eq!(PhoneNumber::parse("٠١٢٣٤٥٦٧٨٩٠"), Err(ValueError::InvalidPhone));
        assert_eq!(PhoneNumber::parse("０３００１２３４５６"), Err(ValueError::InvalidPhone));
    }

    #[test]
    fn test_discount_code() {
        assert_eq!(DiscountCodeValue::parse("  abc123 ").unwrap().as_str(), "ABC123");
        assert!(DiscountCodeValue::parse("   ").is_err());
        let generated = DiscountCodeValue::generate();
        assert_eq!(generated.as_str().len(), DiscountCodeValue::GENERATED_LEN);
        assert_eq!(generated.as_str(), generated.as_str().to_uppercase());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(-3).is_err());
        assert!(Quantity::new(i64::from(Quantity::MAX) + 1).is_err());
        assert_eq!(Quantity::new(3).unwrap().as_i32(), 3);
    }

    #[test]
    fn test_size_parse() {
        assert_eq!("XL".parse::<Size>().unwrap(), Size::XL);
        assert_eq!(" m ".parse::<Size>().unwrap(), Size::M);
        assert_eq!("xl".parse::<Size>().unwrap(), Size::XL);
        assert_eq!("xxl".parse::<Size>(), Err(ValueError::InvalidSize("xxl".into())));
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(900, 1) * Decimal::new(9, 1)), Decimal::new(8100, 2));
    }
}
