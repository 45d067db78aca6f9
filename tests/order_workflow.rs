//! Order placement against the in-memory store: totals, discount redemption,
//! stock accounting under concurrency, and rollback on rejection.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use bzcart_api::domain::aggregates::order::LineRequest;
use bzcart_api::domain::aggregates::{Account, Activity, CartOwner, DiscountCode, EventFilter, Role, StockBucket};
use bzcart_api::domain::value_objects::{DiscountCodeValue, Email, Size};
use bzcart_api::error::AppError;
use bzcart_api::services::cart::CartRequest;
use bzcart_api::services::orders::OrderContext;
use bzcart_api::services::Claims;
use bzcart_api::store::{AccountStore, ActivityStore, DiscountStore, OrderStore};

use common::{issue_code, line, request, Shop};

#[tokio::test]
async fn totals_without_discount() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 500, 60, 10, vec![]).await;

    let order = shop.place(request(vec![line(&shirt, 2, None)], "guest-1")).await.unwrap();
    assert_eq!(order.original_amount, Decimal::from(1120));
    assert_eq!(order.total_amount, order.original_amount);
    assert!(!order.discount_applied);
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 8);
}

#[tokio::test]
async fn totals_with_discount_and_single_use() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 333, 50, 10, vec![]).await;
    let code = issue_code(shop.store.as_ref(), "buyer@example.com", Utc::now()).await;

    let mut with_code = request(vec![line(&shirt, 1, None)], "guest-1");
    with_code.discount_code = Some(code.code.as_str().to_lowercase());
    let order = shop.place(with_code.clone()).await.unwrap();

    assert!(order.discount_applied);
    assert_eq!(order.original_amount, Decimal::from(383));
    assert_eq!(order.total_amount, Decimal::new(34970, 2));
    assert_eq!(order.discount_code.as_deref(), Some(code.code.as_str()));

    let reused = shop.place(with_code).await.unwrap_err();
    assert_eq!(reused.to_string(), "Discount code has already been used");
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 9);
}

#[tokio::test]
async fn code_belongs_to_its_email() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 100, 0, 10, vec![]).await;
    let code = issue_code(shop.store.as_ref(), "someone.else@example.com", Utc::now()).await;

    let mut with_code = request(vec![line(&shirt, 1, None)], "guest-1");
    with_code.discount_code = Some(code.code.as_str().to_string());
    let err = shop.place(with_code).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid or expired discount code");
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 10);
}

#[tokio::test]
async fn expired_code_leaves_stock_and_cart_alone() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 100, 0, 5, vec![]).await;
    let mut code = DiscountCode::issue(&Email::parse("buyer@example.com").unwrap(), Utc::now() - Duration::days(8));
    code.code = DiscountCodeValue::parse("ABC123").unwrap();
    shop.store.issue_discount(&code).await.unwrap();

    let owner = CartOwner::Guest("guest-1".into());
    let add = CartRequest { product_id: Some(shirt.id.to_string()), selected_image: Some("front.jpg".into()), ..Default::default() };
    shop.cart.add(&owner, add).await.unwrap();

    let mut with_code = request(vec![line(&shirt, 2, None)], "guest-1");
    with_code.discount_code = Some("ABC123".into());
    let err = shop.place(with_code).await.unwrap_err();

    assert_eq!(err.to_string(), "Discount code has expired");
    assert_eq!(shop.stock(shirt.id, StockBucket::Flat).await, 5);
    assert_eq!(shop.cart.cart(&owner).await.unwrap().len(), 1);
    assert!(shop.store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_size_is_rejected_without_mutation() {
    let shop = Shop::new();
    let tee = shop.product("TS-2", 100, 0, 0, vec![("M", 2)]).await;

    let err = shop.place(request(vec![line(&tee, 1, Some("L"))], "guest-1")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.to_string(), "Invalid size L for product Product TS-2");
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::M)).await, 2);
    assert!(shop.store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn size_is_matched_case_insensitively() {
    let shop = Shop::new();
    let tee = shop.product("TS-2", 100, 0, 0, vec![("M", 2)]).await;

    let order = shop.place(request(vec![line(&tee, 1, Some("m"))], "guest-1")).await.unwrap();
    assert_eq!(order.products[0].selected_size, Some(Size::M));
    assert_eq!(shop.stock(tee.id, StockBucket::Sized(Size::M)).await, 1);
}

#[tokio::test]
async fn rejected_line_rolls_back_the_whole_order() {
    let shop = Shop::new();
    let plenty = shop.product("TS-1", 100, 0, 10, vec![]).await;
    let scarce = shop.product("TS-2", 100, 0, 1, vec![]).await;

    let err = shop.place(request(vec![line(&plenty, 3, None), line(&scarce, 2, None)], "guest-1")).await.unwrap_err();
    assert_eq!(err.to_string(), "Product Product TS-2 has only 1 units in stock");
    assert_eq!(shop.stock(plenty.id, StockBucket::Flat).await, 10);
    assert_eq!(shop.stock(scarce.id, StockBucket::Flat).await, 1);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let shop = Shop::new();
    let mut bogus = request(vec![], "guest-1");
    bogus.products = Some(vec![LineRequest {
        product_id: Some("not-a-product".into()),
        quantity: Some(1),
        selected_image: Some("front.jpg".into()),
        selected_size: None,
    }]);
    let err = shop.place(bogus).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.to_string(), "Product with ID not-a-product not found");
}

#[tokio::test]
async fn delete_restores_stock() {
    common::delete_restores_stock(&Shop::new()).await;
}

#[tokio::test]
async fn edit_after_order_keeps_the_decrement() {
    common::edit_after_order_keeps_the_decrement(&Shop::new()).await;
}

#[tokio::test]
async fn order_clears_the_guest_cart() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 100, 0, 5, vec![]).await;
    let owner = CartOwner::Guest("guest-9".into());
    let add = CartRequest { product_id: Some(shirt.id.to_string()), selected_image: Some("front.jpg".into()), ..Default::default() };
    shop.cart.add(&owner, add.clone()).await.unwrap();
    let items = shop.cart.add(&owner, add).await.unwrap();
    assert_eq!(items[0].line.quantity, 2);

    shop.place(request(vec![line(&shirt, 2, None)], "guest-9")).await.unwrap();
    assert!(shop.cart.cart(&owner).await.unwrap().is_empty());
    assert_eq!(shop.orders.my_orders(None, Some("guest-9")).await.unwrap().len(), 1);
    assert!(shop.orders.my_orders(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn placement_is_recorded_under_the_account_name() {
    let shop = Shop::new();
    let shirt = shop.product("TS-1", 100, 0, 5, vec![]).await;
    let account = Account::new("nusrat", "nusrat@example.com", "hash".into(), Role::User);
    shop.store.insert_account(&account).await.unwrap();
    let caller = Claims { sub: account.id, role: Role::User, exp: i64::MAX };

    let context = OrderContext { referer: Some("https://shop.example.com/cart".into()) };
    shop.orders.create_order(Some(&caller), request(vec![line(&shirt, 1, None)], "guest-1"), context).await.unwrap();
    shop.place(request(vec![line(&shirt, 1, None)], "guest-2")).await.unwrap();

    let filter = EventFilter { event_type: Some(Activity::ORDER_PLACED.into()), ..Default::default() };
    let mut names: Vec<_> = shop.store.list_activities(&filter).await.unwrap().into_iter().filter_map(|a| a.user_display).collect();
    names.sort();
    assert_eq!(names, vec!["Nusrat Jahan".to_string(), "nusrat".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_orders_for_five_units() {
    common::two_orders_for_five_units(Arc::new(Shop::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_goes_negative() {
    common::stock_never_goes_negative(Arc::new(Shop::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_succeed_once() {
    common::concurrent_redemptions_succeed_once(Arc::new(Shop::new())).await;
}
