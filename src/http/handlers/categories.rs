//! `/api/categories`

use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use uuid::Uuid;

use super::message;
use crate::domain::aggregates::{Category, CategoryPatch};
use crate::error::Result;
use crate::http::extract::{AdminUser, ApiJson, ApiPath};
use crate::AppState;

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.catalog.list_categories().await?))
}

pub async fn get_category(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Category>> {
    Ok(Json(state.catalog.get_category(id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<CategoryPatch>,
) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_category(input).await?)))
}

pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<CategoryPatch>,
) -> Result<Json<Category>> {
    Ok(Json(state.catalog.update_category(id, patch).await?))
}

pub async fn delete_category(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    state.catalog.delete_category(id).await?;
    Ok(message("Category deleted successfully"))
}
