//! HTTP surface.

pub mod extract;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::AppState;
use handlers::{admins, analytics, campaigns, categories, orders, products, users};

pub fn build_router(state: AppState) -> Router {
    let orders = Router::new()
        .route("/create-order", post(orders::create_order))
        .route("/my-orders", get(orders::my_orders))
        .route("/orders", get(orders::list_orders))
        .route("/order/:id", get(orders::get_order).put(orders::update_order).delete(orders::delete_order));

    let users = Router::new()
        .route("/register-user", post(users::register_user))
        .route("/login-user", post(users::login_user))
        .route("/verify-otp", post(users::verify_otp))
        .route("/subscribe", post(users::subscribe))
        .route("/validate-discount", post(users::validate_discount));

    let admins = Router::new()
        .route("/register-admin", post(admins::register_admin))
        .route("/login-admin", post(admins::login_admin))
        .route("/create-admin", post(admins::create_admin))
        .route("/verify-otp", post(users::verify_otp));

    let products = Router::new()
        .route("/products", get(products::list_products))
        .route(
            "/product/:id",
            get(products::get_product).put(products::update_product).delete(products::delete_product),
        )
        .route("/category/:category_id", get(products::products_by_category))
        .route("/create-product", post(products::create_product))
        .route("/cart", get(products::get_cart).post(products::add_to_cart))
        .route("/cart/remove", post(products::remove_from_cart))
        .route("/cart/clear", delete(products::clear_cart))
        .route("/reviews/:product_id", get(products::list_reviews).post(products::add_review));

    let categories = Router::new()
        .route("/", get(categories::list_categories).post(categories::create_category))
        .route(
            "/:id",
            get(categories::get_category).put(categories::update_category).delete(categories::delete_category),
        );

    let campaigns = Router::new()
        .route("/", get(campaigns::list_campaigns).post(campaigns::create_campaign))
        .route("/:campaign_id/send", post(campaigns::send_campaign))
        .route("/:campaign_id", delete(campaigns::delete_campaign));

    let analytics = Router::new()
        .route("/event", post(analytics::track_event))
        .route("/events", get(analytics::list_events))
        .route("/summary", get(analytics::summary))
        .route("/monthly", get(analytics::monthly))
        .route("/cart", get(analytics::cart_for));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy" })) }))
        .nest("/api/orders", orders)
        .nest("/api/users", users)
        .nest("/api/admins", admins)
        .nest("/api/products", products)
        .nest("/api/categories", categories)
        .nest("/api/campaigns", campaigns)
        .nest("/api/analytics", analytics)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
