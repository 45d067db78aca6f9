//! The order scenarios from `order_workflow.rs`, run against PostgreSQL.
//!
//! Needs a scratch database in `TEST_DATABASE_URL`; without it every test returns early.
//! Rows are tagged per run, so the database does not have to be empty.

mod common;

use std::sync::Arc;

use bzcart_api::domain::aggregates::StockBucket;
use bzcart_api::store::PgStore;

use common::Shop;

async fn pg_shop() -> Option<Arc<Shop>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let store = PgStore::connect(&url, 8).await.unwrap();
    store.migrate().await.unwrap();
    Some(Arc::new(Shop::with_store(Arc::new(store))))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_orders_for_five_units() {
    let Some(shop) = pg_shop().await else { return };
    common::two_orders_for_five_units(shop).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_goes_negative() {
    let Some(shop) = pg_shop().await else { return };
    common::stock_never_goes_negative(shop).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_succeed_once() {
    let Some(shop) = pg_shop().await else { return };
    common::concurrent_redemptions_succeed_once(shop).await;
}

#[tokio::test]
async fn delete_restores_stock() {
    let Some(shop) = pg_shop().await else { return };
    common::delete_restores_stock(&shop).await;
}

#[tokio::test]
async fn edit_after_order_keeps_the_decrement() {
    let Some(shop) = pg_shop().await else { return };
    common::edit_after_order_keeps_the_decrement(&shop).await;
}

#[tokio::test]
async fn rejected_order_rolls_back() {
    let Some(shop) = pg_shop().await else { return };
    let run = common::tag();
    let plenty = shop.product(&format!("TS-{run}"), 100, 0, 10, vec![]).await;
    let scarce = shop.product(&format!("TT-{run}"), 100, 0, 1, vec![]).await;
    let code = common::issue_code(shop.store.as_ref(), &format!("buyer-{run}@example.com"), chrono::Utc::now()).await;

    let mut req = common::request(
        vec![common::line(&plenty, 3, None), common::line(&scarce, 2, None)],
        &format!("guest-{run}"),
    );
    req.order_email = Some(format!("buyer-{run}@example.com"));
    req.discount_code = Some(code.code.as_str().to_string());
    assert!(shop.place(req.clone()).await.is_err());

    assert_eq!(shop.stock(plenty.id, StockBucket::Flat).await, 10);
    assert_eq!(shop.stock(scarce.id, StockBucket::Flat).await, 1);

    // The code was not burnt by the rejected attempt.
    req.products = Some(vec![common::line(&plenty, 1, None)]);
    assert!(shop.place(req).await.unwrap().discount_applied);
}
