//! `/api/orders`

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::message;
use crate::domain::aggregates::{Order, OrderRequest};
use crate::error::Result;
use crate::http::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, ClientContext, MaybeAuthUser};
use crate::services::orders::{OrderContext, StatusUpdate};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GuestQuery {
    #[serde(rename = "guestId")]
    pub guest_id: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    client: ClientContext,
    ApiJson(request): ApiJson<OrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let context = OrderContext { referer: client.referer };
    let order = state.orders.create_order(caller.claims(), request, context).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn my_orders(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiQuery(query): ApiQuery<GuestQuery>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders.my_orders(caller.claims(), query.guest_id.as_deref()).await?))
}

pub async fn list_orders(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders.list_orders().await?))
}

pub async fn get_order(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.orders.get_order(id).await?))
}

pub async fn update_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders.update_status(id, update).await?))
}

pub async fn delete_order(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    state.orders.delete_order(id).await?;
    Ok(message("Order deleted successfully"))
}
