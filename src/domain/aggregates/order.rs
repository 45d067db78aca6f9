//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::cart::CartOwner;
use super::discount::{DiscountCode, DiscountError};
use super::product::{Product, StockBucket, StockIssue};
use crate::domain::value_objects::{DiscountCodeValue, Email, PhoneNumber, Quantity, Size, ValueError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<String>,
    pub full_name: String,
    pub order_email: String,
    pub phone_number: String,
    pub shipping_address: String,
    pub products: Vec<OrderLine>,
    /// Post-discount grand total.
    pub total_amount: Decimal,
    /// Pre-discount grand total.
    pub original_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_applied: bool,
    pub discount_code: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub selected_image: String,
    /// Only set for products that track stock per size.
    pub selected_size: Option<Size>,
}

impl OrderLine {
    pub fn bucket(&self) -> StockBucket {
        self.selected_size.map_or(StockBucket::Flat, StockBucket::Sized)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(OrderError::InvalidStatus),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { Pending, #[default] Completed, Failed }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Completed => "completed", Self::Failed => "failed" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(OrderError::InvalidStatus),
        }
    }
}

/// Raw create-order body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderRequest {
    pub products: Option<Vec<LineRequest>>,
    /// Client-computed subtotal. Only compared against the server figure.
    pub total_amount: Option<Decimal>,
    pub shipping_address: Option<String>,
    pub order_email: Option<String>,
    pub phone_number: Option<String>,
    pub full_name: Option<String>,
    #[serde(rename = "guestId")]
    pub guest_id: Option<String>,
    pub discount_code: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LineRequest {
    pub product_id: Option<String>,
    pub quantity: Option<i64>,
    pub selected_image: Option<String>,
    pub selected_size: Option<String>,
}

/// A line whose shape has been checked but whose product has not been loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub selected_image: String,
    pub selected_size: Option<String>,
}

/// Contact and shipping fields after format validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckedRequest {
    pub lines: Vec<RequestedLine>,
    pub shipping_address: String,
    pub order_email: Email,
    pub phone_number: PhoneNumber,
    pub full_name: String,
    pub guest_id: Option<String>,
    pub discount_code: Option<DiscountCodeValue>,
    pub client_total: Option<Decimal>,
}

fn required(value: Option<&str>, err: OrderError) -> Result<&str, OrderError> {
    value.map(str::trim).filter(|v| !v.is_empty()).ok_or(err)
}

impl OrderRequest {
    /// Field presence and format checks, in the order they are reported.
    pub fn check(&self) -> Result<CheckedRequest, OrderError> {
        let raw_lines = self.products.as_deref().filter(|p| !p.is_empty()).ok_or(OrderError::NoProducts)?;
        let shipping_address = required(self.shipping_address.as_deref(), OrderError::MissingShippingAddress)?;
        let email = required(self.order_email.as_deref(), OrderError::MissingEmail)?;
        let phone = required(self.phone_number.as_deref(), OrderError::MissingPhone)?;
        let full_name = required(self.full_name.as_deref(), OrderError::MissingFullName)?;
        let order_email = Email::parse(email)?;
        let phone_number = PhoneNumber::parse(phone)?;

        let lines = raw_lines.iter().map(LineRequest::check).collect::<Result<Vec<_>, _>>()?;
        let discount_code = match self.discount_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(DiscountCodeValue::parse(code).map_err(|_| OrderError::Discount(DiscountError::NotFound))?),
            None => None,
        };

        Ok(CheckedRequest {
            lines,
            shipping_address: shipping_address.to_string(),
            order_email,
            phone_number,
            full_name: full_name.to_string(),
            guest_id: self.guest_id.as_deref().map(str::trim).filter(|g| !g.is_empty()).map(str::to_string),
            discount_code,
            client_total: self.total_amount,
        })
    }
}

impl LineRequest {
    fn check(&self) -> Result<RequestedLine, OrderError> {
        let raw_id = required(self.product_id.as_deref(), OrderError::InvalidLine)?;
        let image = required(self.selected_image.as_deref(), OrderError::InvalidLine)?;
        let quantity = self.quantity.ok_or(OrderError::InvalidLine)?;
        let product_id = raw_id.parse::<Uuid>().map_err(|_| OrderError::ProductNotFound(raw_id.to_string()))?;
        Ok(RequestedLine {
            product_id,
            quantity: Quantity::new(quantity).map_err(|_| OrderError::InvalidLine)?,
            selected_image: image.to_string(),
            selected_size: self.selected_size.clone(),
        })
    }
}

/// A requested line matched against its loaded product.
#[derive(Clone, Debug, PartialEq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub selected_image: String,
    pub bucket: StockBucket,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub unit_shipping: Decimal,
}

impl PricedLine {
    /// Validates stock for one line against a freshly loaded product.
    pub fn price(line: &RequestedLine, product: &Product) -> Result<Self, OrderError> {
        let bucket = product.check_stock(line.selected_size.as_deref(), line.quantity).map_err(|issue| match issue {
            StockIssue::SizeRequired => OrderError::SizeRequired(product.name.clone()),
            StockIssue::UnknownSize(size) => OrderError::InvalidSize { product: product.name.clone(), size },
            StockIssue::Insufficient { bucket: StockBucket::Flat, available } => {
                OrderError::InsufficientStock { product: product.name.clone(), available }
            }
            StockIssue::Insufficient { bucket: StockBucket::Sized(size), available } => {
                OrderError::InsufficientSizeStock { product: product.name.clone(), size, available }
            }
        })?;
        Ok(Self {
            product_id: product.id,
            product_name: product.name.clone(),
            selected_image: line.selected_image.clone(),
            bucket,
            quantity: line.quantity,
            unit_price: product.discounted_price,
            unit_shipping: product.shipping,
        })
    }

    pub fn to_order_line(&self) -> OrderLine {
        OrderLine {
            product_id: self.product_id,
            quantity: self.quantity.as_i32(),
            selected_image: self.selected_image.clone(),
            selected_size: self.bucket.size(),
        }
    }
}

/// Money figures of one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub original_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_applied: bool,
}

impl OrderTotals {
    pub fn compute(lines: &[PricedLine], discounted: bool) -> Self {
        let subtotal: Decimal = lines.iter().map(|l| l.unit_price * l.quantity.as_decimal()).sum();
        let shipping_total: Decimal = lines.iter().map(|l| l.unit_shipping * l.quantity.as_decimal()).sum();
        let final_subtotal = if discounted { DiscountCode::apply_to(subtotal) } else { subtotal };
        Self {
            subtotal,
            shipping_total,
            original_amount: subtotal + shipping_total,
            total_amount: final_subtotal + shipping_total,
            discount_applied: discounted,
        }
    }
}

/// Code and owner email the order claims as part of its atomic unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscountClaim {
    pub code: DiscountCodeValue,
    pub email: String,
}

/// Everything the store needs to persist an order atomically.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderDraft {
    pub order: Order,
    pub claim: Option<DiscountClaim>,
    /// Cart emptied on success.
    pub owner: Option<CartOwner>,
}

impl OrderDraft {
    pub fn build(request: CheckedRequest, owner: Option<CartOwner>, lines: &[PricedLine], claim: Option<DiscountClaim>) -> Self {
        let totals = OrderTotals::compute(lines, claim.is_some());
        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            user_id: owner.as_ref().and_then(CartOwner::user_id),
            guest_id: owner.as_ref().and_then(CartOwner::guest_id).map(str::to_string),
            full_name: request.full_name,
            order_email: request.order_email.as_str().to_string(),
            phone_number: request.phone_number.as_str().to_string(),
            shipping_address: request.shipping_address,
            products: lines.iter().map(PricedLine::to_order_line).collect(),
            total_amount: totals.total_amount,
            original_amount: totals.original_amount,
            shipping_amount: totals.shipping_total,
            discount_applied: totals.discount_applied,
            discount_code: claim.as_ref().map(|c| c.code.as_str().to_string()),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Completed,
            created_at: now,
            updated_at: now,
        };
        Self { order, claim, owner }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("No products provided for order")]
    NoProducts,
    #[error("Shipping address is required")]
    MissingShippingAddress,
    #[error("Email address is required")]
    MissingEmail,
    #[error("Phone number is required")]
    MissingPhone,
    #[error("Full name is required")]
    MissingFullName,
    #[error("Each product must have product_id, quantity, and selected_image")]
    InvalidLine,
    #[error("Product with ID {0} not found")]
    ProductNotFound(String),
    #[error("Product {0} requires a size selection")]
    SizeRequired(String),
    #[error("Invalid size {size} for product {product}")]
    InvalidSize { product: String, size: String },
    #[error("Product {product} size {size} has only {available} units in stock")]
    InsufficientSizeStock { product: String, size: Size, available: i32 },
    #[error("Product {product} has only {available} units in stock")]
    InsufficientStock { product: String, available: i32 },
    /// Stock moved between validation and the conditional decrement.
    #[error("Insufficient stock for product {0}")]
    StockConflict(Uuid),
    #[error("Order not found")]
    NotFound,
    #[error("Invalid status")]
    InvalidStatus,
    #[error(transparent)]
    Discount(#[from] DiscountError),
    #[error("{0}")]
    Value(#[from] ValueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::SizeStock;
    use crate::domain::value_objects::HexColor;

    fn product(price: i64, shipping: i64, stock: i32, sizes: Vec<SizeStock>) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::now_v7(), name: "Linen Shirt".into(), description: String::new(),
            base_price: Decimal::new(price, 0), discounted_price: Decimal::new(price, 0),
            stock, sizes, warranty: String::new(), images: vec!["a.webp".into()],
            category_id: Uuid::now_v7(), subcategory_ids: vec![], brand_name: "BZ".into(),
            product_code: "LS-1".into(), rating: 4.0, bg_color: HexColor::default(),
            shipping: Decimal::new(shipping, 0), payment_methods: vec!["cod".into()],
            is_new_arrival: false, is_best_seller: false, created_at: now, updated_at: now,
        }
    }

    fn line(product: &Product, qty: i64, size: Option<&str>) -> RequestedLine {
        RequestedLine {
            product_id: product.id, quantity: Quantity::new(qty).unwrap(),
            selected_image: "a.webp".into(), selected_size: size.map(str::to_string),
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            products: Some(vec![LineRequest {
                product_id: Some(Uuid::now_v7().to_string()), quantity: Some(1),
                selected_image: Some("a.webp".into()), selected_size: None,
            }]),
            total_amount: None,
            shipping_address: Some("12 Mall Road, Lahore".into()),
            order_email: Some("a@x.com".into()),
            phone_number: Some("+923001234567".into()),
            full_name: Some("Ayesha Khan".into()),
            guest_id: None,
            discount_code: Some(" abc123 ".into()),
        }
    }

    #[test]
    fn test_request_checks_in_order() {
        assert_eq!(OrderRequest::default().check(), Err(OrderError::NoProducts));
        let mut req = request();
        req.shipping_address = None;
        req.order_email = Some("bad".into());
        assert_eq!(req.check(), Err(OrderError::MissingShippingAddress));
        let mut req = request();
        req.phone_number = Some("123".into());
        assert_eq!(req.check(), Err(OrderError::Value(ValueError::InvalidPhone)));
        let mut req = request();
        req.products.as_mut().unwrap()[0].quantity = Some(0);
        assert_eq!(req.check(), Err(OrderError::InvalidLine));
        let checked = request().check().unwrap();
        assert_eq!(checked.discount_code.unwrap().as_str(), "ABC123");
    }

    #[test]
    fn test_sized_stock_errors() {
        let p = product(10, 1, 0, vec![SizeStock { size: Size::M, stock: 2 }]);
        assert!(matches!(PricedLine::price(&line(&p, 1, None), &p), Err(OrderError::SizeRequired(_))));
        assert!(matches!(PricedLine::price(&line(&p, 1, Some("L")), &p), Err(OrderError::InvalidSize { .. })));
        assert!(matches!(
            PricedLine::price(&line(&p, 3, Some("M")), &p),
            Err(OrderError::InsufficientSizeStock { available: 2, .. })
        ));
        let priced = PricedLine::price(&line(&p, 2, Some("M")), &p).unwrap();
        assert_eq!(priced.to_order_line().selected_size, Some(Size::M));
    }

    #[test]
    fn test_unsized_ignores_selected_size() {
        let p = product(10, 1, 5, vec![]);
        let priced = PricedLine::price(&line(&p, 2, Some("XL")), &p).unwrap();
        assert_eq!(priced.bucket, StockBucket::Flat);
        assert_eq!(priced.to_order_line().selected_size, None);
    }

    #[test]
    fn test_totals_with_and_without_discount() {
        let a = product(50, 5, 10, vec![]);
        let b = product(25, 0, 10, vec![]);
        let lines = vec![
            PricedLine::price(&line(&a, 2, None), &a).unwrap(),
            PricedLine::price(&line(&b, 1, None), &b).unwrap(),
        ];
        let plain = OrderTotals::compute(&lines, false);
        assert_eq!(plain.subtotal, Decimal::new(125, 0));
        assert_eq!(plain.shipping_total, Decimal::new(10, 0));
        assert_eq!(plain.total_amount, plain.original_amount);

        let discounted = OrderTotals::compute(&lines, true);
        assert_eq!(discounted.original_amount, Decimal::new(135, 0));
        assert_eq!(discounted.total_amount, Decimal::new(12250, 2) + Decimal::new(10, 0));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!("lost".parse::<OrderStatus>(), Err(OrderError::InvalidStatus));
    }
}
