//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{HexColor, Quantity, Size, ValueError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: Decimal,
    pub discounted_price: Decimal,
    /// Flat stock counter; ignored when `sizes` is non-empty.
    pub stock: i32,
    pub sizes: Vec<SizeStock>,
    pub warranty: String,
    pub images: Vec<String>,
    pub category_id: Uuid,
    pub subcategory_ids: Vec<Uuid>,
    pub brand_name: String,
    pub product_code: String,
    pub rating: f64,
    pub bg_color: HexColor,
    pub shipping: Decimal,
    pub payment_methods: Vec<String>,
    pub is_new_arrival: bool,
    pub is_best_seller: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStock { pub size: Size, pub stock: i32 }

/// Which counter a line item draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StockBucket { Flat, Sized(Size) }

impl StockBucket {
    pub fn size(&self) -> Option<Size> {
        match self { Self::Flat => None, Self::Sized(size) => Some(*size) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StockIssue {
    SizeRequired,
    UnknownSize(String),
    Insufficient { bucket: StockBucket, available: i32 },
}

impl Product {
    pub const DEFAULT_RATING: f64 = 4.0;

    pub fn is_sized(&self) -> bool { !self.sizes.is_empty() }

    /// Resolves the bucket a selection draws from. Unsized products ignore the size.
    pub fn bucket_for(&self, selected_size: Option<&str>) -> Result<StockBucket, StockIssue> {
        if !self.is_sized() { return Ok(StockBucket::Flat); }
        let raw = selected_size.map(str::trim).filter(|s| !s.is_empty()).ok_or(StockIssue::SizeRequired)?;
        let size: Size = raw.parse().map_err(|_| StockIssue::UnknownSize(raw.to_string()))?;
        if self.sizes.iter().any(|s| s.size == size) { Ok(StockBucket::Sized(size)) } else { Err(StockIssue::UnknownSize(raw.to_string())) }
    }

    pub fn available(&self, bucket: StockBucket) -> i32 {
        match bucket {
            StockBucket::Flat => self.stock,
            StockBucket::Sized(size) => self.sizes.iter().find(|s| s.size == size).map_or(0, |s| s.stock),
        }
    }

    /// Checks that `quantity` units can be drawn from the selected bucket.
    pub fn check_stock(&self, selected_size: Option<&str>, quantity: Quantity) -> Result<StockBucket, StockIssue> {
        let bucket = self.bucket_for(selected_size)?;
        let available = self.available(bucket);
        if available < quantity.as_i32() { return Err(StockIssue::Insufficient { bucket, available }); }
        Ok(bucket)
    }

    /// Applies a signed stock delta. Returns false, leaving the product untouched,
    /// if the bucket is missing or the result would be negative.
    pub fn adjust_stock(&mut self, bucket: StockBucket, delta: i32) -> bool {
        let counter = match bucket {
            StockBucket::Flat => Some(&mut self.stock),
            StockBucket::Sized(size) => self.sizes.iter_mut().find(|s| s.size == size).map(|s| &mut s.stock),
        };
        match counter {
            Some(stock) if *stock + delta >= 0 => { *stock += delta; true }
            _ => false,
        }
    }

    pub fn belongs_to(&self, category_id: Uuid) -> bool {
        self.category_id == category_id || self.subcategory_ids.contains(&category_id)
    }
}

/// Create-product body. Every field is optional so missing ones surface as one validation error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<Decimal>,
    pub discounted_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub sizes: Option<Vec<SizeStockInput>>,
    pub warranty: Option<String>,
    pub images: Option<Vec<String>>,
    pub category: Option<Uuid>,
    pub subcategories: Option<Vec<Uuid>>,
    pub brand_name: Option<String>,
    pub product_code: Option<String>,
    pub rating: Option<f64>,
    pub bg_color: Option<String>,
    pub shipping: Option<Decimal>,
    pub payment: Option<Vec<String>>,
    pub is_new_arrival: Option<bool>,
    pub is_best_seller: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SizeStockInput { pub size: String, pub stock: i32 }

fn present(value: &Option<String>) -> bool { value.as_deref().is_some_and(|s| !s.trim().is_empty()) }

impl ProductInput {
    pub fn check_required(&self) -> Result<(), CatalogError> {
        let ok = present(&self.name)
            && self.base_price.is_some()
            && self.discounted_price.is_some()
            && self.images.is_some()
            && self.category.is_some()
            && present(&self.brand_name)
            && present(&self.product_code)
            && self.shipping.is_some()
            && self.payment.is_some();
        if ok { Ok(()) } else { Err(CatalogError::MissingFields) }
    }

    /// Builds the product once category checks have passed.
    pub fn into_product(self, now: DateTime<Utc>) -> Result<Product, CatalogError> {
        self.check_required()?;
        let base_price = self.base_price.unwrap_or_default();
        let discounted_price = self.discounted_price.unwrap_or_default();
        validate_prices(base_price, discounted_price)?;
        let shipping = self.shipping.unwrap_or_default();
        validate_shipping(shipping)?;
        let stock = self.stock.unwrap_or(0);
        validate_stock(stock)?;
        let sizes = parse_sizes(self.sizes.unwrap_or_default())?;
        let payment_methods = validate_payment(self.payment.unwrap_or_default())?;
        let bg_color = match self.bg_color.as_deref().filter(|c| !c.is_empty()) {
            Some(c) => HexColor::parse(c)?,
            None => HexColor::default(),
        };
        Ok(Product {
            id: Uuid::now_v7(),
            name: self.name.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default(),
            base_price, discounted_price, stock, sizes,
            warranty: self.warranty.unwrap_or_default(),
            images: self.images.unwrap_or_default(),
            category_id: self.category.unwrap_or_default(),
            subcategory_ids: self.subcategories.unwrap_or_default(),
            brand_name: self.brand_name.unwrap_or_default().trim().to_string(),
            product_code: self.product_code.unwrap_or_default().trim().to_string(),
            rating: self.rating.filter(|r| *r > 0.0).unwrap_or(Product::DEFAULT_RATING),
            bg_color, shipping, payment_methods,
            is_new_arrival: self.is_new_arrival.unwrap_or(false),
            is_best_seller: self.is_best_seller.unwrap_or(false),
            created_at: now, updated_at: now,
        })
    }
}

/// Partial product update: `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<Decimal>,
    pub discounted_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub sizes: Option<Vec<SizeStockInput>>,
    pub warranty: Option<String>,
    pub images: Option<Vec<String>>,
    pub category: Option<Uuid>,
    pub subcategories: Option<Vec<Uuid>>,
    pub brand_name: Option<String>,
    pub product_code: Option<String>,
    pub rating: Option<f64>,
    pub bg_color: Option<String>,
    pub shipping: Option<Decimal>,
    pub payment: Option<Vec<String>>,
    pub is_new_arrival: Option<bool>,
    pub is_best_seller: Option<bool>,
}

/// Counters a product edit overwrites. Columns not listed here are only written
/// when set, so an edit never replays a stale stock level or rating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterWrites {
    pub stock: bool,
    pub sizes: bool,
    pub rating: bool,
}

impl ProductPatch {
    pub fn counters(&self) -> CounterWrites {
        CounterWrites {
            stock: self.stock.is_some(),
            sizes: self.sizes.is_some(),
            rating: self.rating.is_some_and(|r| r > 0.0),
        }
    }

    pub fn apply(self, current: &Product, now: DateTime<Utc>) -> Result<Product, CatalogError> {
        let mut next = current.clone();
        if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) { next.name = name.trim().to_string(); }
        if let Some(description) = self.description { next.description = description; }
        if let Some(price) = self.base_price { next.base_price = price; }
        if let Some(price) = self.discounted_price { next.discounted_price = price; }
        validate_prices(next.base_price, next.discounted_price)?;
        if let Some(shipping) = self.shipping { validate_shipping(shipping)?; next.shipping = shipping; }
        if let Some(stock) = self.stock { validate_stock(stock)?; next.stock = stock; }
        if let Some(sizes) = self.sizes { next.sizes = parse_sizes(sizes)?; }
        if let Some(warranty) = self.warranty { next.warranty = warranty; }
        if let Some(images) = self.images { next.images = images; }
        if let Some(category) = self.category { next.category_id = category; }
        if let Some(subcategories) = self.subcategories { next.subcategory_ids = subcategories; }
        if let Some(brand) = self.brand_name.filter(|b| !b.trim().is_empty()) { next.brand_name = brand.trim().to_string(); }
        if let Some(code) = self.product_code.filter(|c| !c.trim().is_empty()) { next.product_code = code.trim().to_string(); }
        if let Some(rating) = self.rating.filter(|r| *r > 0.0) { next.rating = rating; }
        if let Some(color) = self.bg_color.filter(|c| !c.is_empty()) { next.bg_color = HexColor::parse(&color)?; }
        if let Some(payment) = self.payment { next.payment_methods = validate_payment(payment)?; }
        if let Some(flag) = self.is_new_arrival { next.is_new_arrival = flag; }
        if let Some(flag) = self.is_best_seller { next.is_best_seller = flag; }
        next.updated_at = now;
        Ok(next)
    }
}

fn validate_prices(base: Decimal, discounted: Decimal) -> Result<(), CatalogError> {
    if base <= Decimal::ZERO || discounted <= Decimal::ZERO { return Err(CatalogError::InvalidPrice); }
    if discounted > base { return Err(CatalogError::DiscountAboveBase); }
    Ok(())
}

fn validate_shipping(shipping: Decimal) -> Result<(), CatalogError> {
    if shipping < Decimal::ZERO { Err(CatalogError::InvalidShipping) } else { Ok(()) }
}

fn validate_stock(stock: i32) -> Result<(), CatalogError> {
    if stock < 0 { Err(CatalogError::InvalidStock) } else { Ok(()) }
}

fn validate_payment(methods: Vec<String>) -> Result<Vec<String>, CatalogError> {
    let methods: Vec<String> = methods.into_iter().map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect();
    if methods.is_empty() { Err(CatalogError::NoPaymentMethod) } else { Ok(methods) }
}

fn parse_sizes(input: Vec<SizeStockInput>) -> Result<Vec<SizeStock>, CatalogError> {
    let mut sizes: Vec<SizeStock> = Vec::with_capacity(input.len());
    for entry in input {
        let size: Size = entry.size.parse().map_err(|_| CatalogError::InvalidSizes)?;
        if entry.stock < 0 || sizes.iter().any(|s| s.size == size) { return Err(CatalogError::InvalidSizes); }
        sizes.push(SizeStock { size, stock: entry.stock });
    }
    Ok(sizes)
}

/// Product review; one per (user, product).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("Please provide all required fields")]
    MissingFields,
    #[error("Product not found")]
    ProductNotFound,
    #[error("Product with code {0} already exists")]
    DuplicateProductCode(String),
    #[error("Invalid category ID or category is a subcategory")]
    InvalidCategory,
    #[error("Invalid subcategories or they do not belong to the specified category")]
    InvalidSubcategories,
    #[error("Prices must be valid positive numbers")]
    InvalidPrice,
    #[error("Discounted price cannot be higher than base price")]
    DiscountAboveBase,
    #[error("Shipping cost must be a non-negative number")]
    InvalidShipping,
    #[error("Stock must be a non-negative number")]
    InvalidStock,
    #[error("Invalid size or stock value. Sizes must be S, M, L, or XL.")]
    InvalidSizes,
    #[error("At least one payment method is required")]
    NoPaymentMethod,
    #[error("No products found in this category or subcategory")]
    EmptyCategory,
    #[error("Category not found")]
    CategoryNotFound,
    #[error("Parent category not found")]
    ParentNotFound,
    #[error("Invalid parent category ID")]
    InvalidParentId,
    #[error("Category cannot be its own parent")]
    SelfParent,
    #[error("Cannot delete category: {0} subcategory(ies) associated")]
    HasSubcategories(usize),
    #[error("Cannot delete category: {0} product(s) associated")]
    HasProducts(usize),
    #[error("Category name is required")]
    MissingCategoryName,
    #[error("You have already reviewed this product")]
    AlreadyReviewed,
    #[error("{0}")]
    Value(#[from] ValueError),
}
