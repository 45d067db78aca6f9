//! `/api/analytics`

use axum::{extract::State, http::StatusCode, Json};

use crate::domain::aggregates::{Activity, ActivityInput, ActivitySummary, EventFilter, MonthlyStats};
use crate::error::Result;
use crate::http::extract::{AdminUser, ApiJson, ApiQuery, ClientContext, MaybeAuthUser};
use crate::services::cart::{CartItem, CartLookup};
use crate::AppState;

/// Public. Responds before enrichment has run.
pub async fn track_event(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    client: ClientContext,
    ApiJson(input): ApiJson<ActivityInput>,
) -> Result<(StatusCode, Json<Activity>)> {
    let activity = state.analytics.ingest(input, caller.claims(), client.ip, client.user_agent).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn list_events(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(filter): ApiQuery<EventFilter>,
) -> Result<Json<Vec<Activity>>> {
    Ok(Json(state.analytics.events(&filter).await?))
}

pub async fn summary(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<ActivitySummary>> {
    Ok(Json(state.analytics.summary().await?))
}

pub async fn monthly(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<MonthlyStats>> {
    Ok(Json(state.analytics.monthly().await?))
}

pub async fn cart_for(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(lookup): ApiQuery<CartLookup>,
) -> Result<Json<Vec<CartItem>>> {
    Ok(Json(state.cart.cart(&lookup.any_owner()?).await?))
}
