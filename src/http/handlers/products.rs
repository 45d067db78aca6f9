//! `/api/products`: catalog, carts and reviews.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use super::message;
use crate::domain::aggregates::{Product, ProductInput, ProductPatch, Review};
use crate::error::Result;
use crate::http::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser, MaybeAuthUser};
use crate::services::cart::{CartItem, CartLookup, CartRequest};
use crate::services::catalog::ReviewRequest;
use crate::AppState;

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products().await?))
}

pub async fn get_product(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.get_product(id).await?))
}

pub async fn products_by_category(State(state): State<AppState>, ApiPath(category_id): ApiPath<Uuid>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog.products_by_category(category_id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_product(input).await?)))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog.update_product(id, patch).await?))
}

pub async fn delete_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    state.catalog.delete_product(id).await?;
    Ok(message("Product deleted successfully"))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiJson(request): ApiJson<CartRequest>,
) -> Result<Json<Vec<CartItem>>> {
    let owner = CartLookup { guest_id: request.guest_id.clone(), user_id: None }.shopper(caller.claims().map(|c| c.sub))?;
    Ok(Json(state.cart.add(&owner, request).await?))
}

pub async fn get_cart(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiQuery(lookup): ApiQuery<CartLookup>,
) -> Result<Json<Vec<CartItem>>> {
    let owner = lookup.shopper(caller.claims().map(|c| c.sub))?;
    Ok(Json(state.cart.cart(&owner).await?))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiJson(request): ApiJson<CartRequest>,
) -> Result<Json<Vec<CartItem>>> {
    let owner = CartLookup { guest_id: request.guest_id.clone(), user_id: None }.shopper(caller.claims().map(|c| c.sub))?;
    Ok(Json(state.cart.remove(&owner, request).await?))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiQuery(lookup): ApiQuery<CartLookup>,
) -> Result<Json<Value>> {
    let owner = lookup.shopper(caller.claims().map(|c| c.sub))?;
    let removed = state.cart.clear(&owner).await?;
    Ok(Json(json!({ "message": "Cart cleared successfully", "removed": removed })))
}

pub async fn add_review(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(state.catalog.add_review(&caller, product_id, request).await?)))
}

pub async fn list_reviews(State(state): State<AppState>, ApiPath(product_id): ApiPath<Uuid>) -> Result<Json<Vec<Review>>> {
    Ok(Json(state.catalog.list_reviews(product_id).await?))
}
