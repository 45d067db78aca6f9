//! Shop harness shared by the store-level test suites, plus the order scenarios
//! every store implementation has to pass.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use bzcart_api::domain::aggregates::order::LineRequest;
use bzcart_api::domain::aggregates::product::SizeStockInput;
use bzcart_api::domain::aggregates::{CategoryPatch, DiscountCode, Order, OrderRequest, Product, ProductInput, StockBucket};
use bzcart_api::domain::value_objects::{Email, Size};
use bzcart_api::error::AppError;
use bzcart_api::services::cart::CartService;
use bzcart_api::services::orders::{OrderContext, OrderService};
use bzcart_api::services::{CatalogService, EventPublisher};
use bzcart_api::store::{CatalogStore, DiscountStore, MemoryStore, Store};

pub struct Shop {
    pub store: Arc<dyn Store>,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub cart: CartService,
}

impl Shop {
    pub fn new() -> Self { Self::with_store(Arc::new(MemoryStore::new())) }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            orders: OrderService::new(store.clone(), EventPublisher::disabled()),
            cart: CartService::new(store.clone()),
            store,
        }
    }

    pub async fn product(&self, code: &str, price: i64, shipping: i64, stock: i32, sizes: Vec<(&str, i32)>) -> Product {
        let category = self
            .catalog
            .create_category(CategoryPatch { name: Some(format!("Category {code}")), parent_category: None })
            .await
            .unwrap();
        let input = ProductInput {
            name: Some(format!("Product {code}")),
            base_price: Some(Decimal::from(price)),
            discounted_price: Some(Decimal::from(price)),
            stock: Some(stock),
            sizes: Some(sizes.into_iter().map(|(size, stock)| SizeStockInput { size: size.into(), stock }).collect()),
            images: Some(vec!["front.jpg".into()]),
            category: Some(category.id),
            brand_name: Some("BZ".into()),
            product_code: Some(code.into()),
            shipping: Some(Decimal::from(shipping)),
            payment: Some(vec!["cod".into()]),
            ..Default::default()
        };
        self.catalog.create_product(input).await.unwrap()
    }

    pub async fn stock(&self, id: Uuid, bucket: StockBucket) -> i32 {
        self.store.get_product(id).await.unwrap().unwrap().available(bucket)
    }

    pub async fn place(&self, request: OrderRequest) -> Result<Order, AppError> {
        self.orders.create_order(None, request, OrderContext::default()).await
    }
}

pub fn line(product: &Product, quantity: i64, size: Option<&str>) -> LineRequest {
    LineRequest {
        product_id: Some(product.id.to_string()),
        quantity: Some(quantity),
        selected_image: Some("front.jpg".into()),
        selected_size: size.map(str::to_string),
    }
}

pub fn request(lines: Vec<LineRequest>, guest: &str) -> OrderRequest {
    OrderRequest {
        products: Some(lines),
        total_amount: None,
        shipping_address: Some("House 12, Road 4, Dhanmondi".into()),
        order_email: Some("buyer@example.com".into()),
        phone_number: Some("01712345678".into()),
        full_name: Some("Nusrat Jahan".into()),
        guest_id: Some(guest.into()),
        discount_code: None,
    }
}

pub async fn issue_code(store: &dyn Store, email: &str, issued_at: chrono::DateTime<Utc>) -> DiscountCode {
    let code = DiscountCode::issue(&Email::parse(email).unwrap(), issued_at);
    store.issue_discount(&code).await.unwrap();
    code
}

/// Product codes and guest ids unique per run, for stores that outlive the test.
pub fn tag() -> String { Uuid::now_v7().simple().to_string() }

async fn count_placed(attempts: Vec<tokio::task::JoinHandle<Result<Order, AppError>>>) -> usize {
    let mut placed = 0;
    for attempt in attempts {
        if attempt.await.unwrap().is_ok() {
            placed += 1;
        }
    }
    placed
}

pub async fn two_orders_for_five_units(shop: Arc<Shop>) {
    let run = tag();
    let shirt = shop.product(&format!("TS-{run}"), 100, 0, 5, vec![]).await;

    let attempts = (0..2)
        .map(|i| {
            let shop = shop.clone();
            let req = request(vec![line(&shirt, 3, None)], &format!("guest-{run}-{i}"));
            tokio::spawn(async move { shop.place(req).await })
        })
        .collect();
    assert_eq!(count_placed(attempts).await, 1);
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 2);
}

pub async fn stock_never_goes_negative(shop: Arc<Shop>) {
    let run = tag();
    let tee = shop.product(&format!("TS-{run}"), 100, 0, 0, vec![("S", 7)]).await;

    let attempts = (0..20)
        .map(|i| {
            let shop = shop.clone();
            let req = request(vec![line(&tee, 1, Some("S"))], &format!("guest-{run}-{i}"));
            tokio::spawn(async move { shop.place(req).await })
        })
        .collect();
    assert_eq!(count_placed(attempts).await, 7);
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::S)).await, 0);
}

pub async fn concurrent_redemptions_succeed_once(shop: Arc<Shop>) {
    let run = tag();
    let shirt = shop.product(&format!("TS-{run}"), 100, 0, 50, vec![]).await;
    let email = format!("buyer-{run}@example.com");
    let code = issue_code(shop.store.as_ref(), &email, Utc::now()).await;

    let attempts: Vec<_> = (0..10)
        .map(|i| {
            let shop = shop.clone();
            let mut req = request(vec![line(&shirt, 1, None)], &format!("guest-{run}-{i}"));
            req.order_email = Some(email.clone());
            req.discount_code = Some(code.code.as_str().to_string());
            tokio::spawn(async move { shop.place(req).await })
        })
        .collect();
    let mut redeemed = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(order) => {
                assert!(order.discount_applied);
                redeemed += 1;
            }
            Err(e) => assert!(matches!(e, AppError::Conflict(_)), "unexpected error: {e}"),
        }
    }
    assert_eq!(redeemed, 1);
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 49);
}

pub async fn delete_restores_stock(shop: &Shop) {
    let run = tag();
    let tee = shop.product(&format!("TS-{run}"), 100, 0, 0, vec![("M", 4), ("XL", 1)]).await;
    let guest = format!("guest-{run}");

    let order = shop.place(request(vec![line(&tee, 3, Some("M")), line(&tee, 1, Some("XL"))], &guest)).await.unwrap();
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::M)).await, 1);
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::XL)).await, 0);

    shop.orders.delete_order(order.id).await.unwrap();
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::M)).await, 4);
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::XL)).await, 1);
    assert_eq!(shop.orders.get_order(order.id).await.unwrap_err().to_string(), "Order not found");
}

/// An admin edit that read the product before an order landed must not put the sold units back.
pub async fn edit_after_order_keeps_the_decrement(shop: &Shop) {
    use bzcart_api::domain::aggregates::ProductPatch;

    let run = tag();
    let shirt = shop.product(&format!("TS-{run}"), 100, 0, 5, vec![]).await;
    let tee = shop.product(&format!("TT-{run}"), 100, 0, 0, vec![("M", 4)]).await;

    let stale_shirt = shop.store.get_product(shirt.id).await.unwrap().unwrap();
    let stale_tee = shop.store.get_product(tee.id).await.unwrap().unwrap();
    shop.place(request(vec![line(&shirt, 3, None), line(&tee, 1, Some("M"))], &format!("guest-{run}"))).await.unwrap();

    for stale in [stale_shirt, stale_tee] {
        let patch = ProductPatch { name: Some(format!("{} v2", stale.name)), ..Default::default() };
        let counters = patch.counters();
        let next = patch.apply(&stale, Utc::now()).unwrap();
        let stored = shop.store.update_product(&next, counters).await.unwrap().unwrap();
        assert!(stored.name.ends_with(" v2"));
    }
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 2);
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::M)).await, 3);

    let restock = ProductPatch { stock: Some(10), ..Default::default() };
    let edited = shop.catalog.update_product(shirt.id, restock).await.unwrap();
    assert_eq!(edited.stock, 10);
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 10);
}
