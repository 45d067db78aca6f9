//! `/api/campaigns` (admin only)

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use super::message;
use crate::domain::aggregates::Campaign;
use crate::error::Result;
use crate::http::extract::{AdminUser, ApiJson, ApiPath};
use crate::services::campaigns::CampaignRequest;
use crate::AppState;

pub async fn create_campaign(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(request): ApiJson<CampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>)> {
    Ok((StatusCode::CREATED, Json(state.campaigns.create(request).await?)))
}

pub async fn list_campaigns(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Campaign>>> {
    Ok(Json(state.campaigns.list().await?))
}

pub async fn send_campaign(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let campaign = state.campaigns.send(id).await?;
    Ok(Json(json!({
        "message": format!("Campaign sent to {} users", campaign.recipient_count),
        "campaign": campaign,
    })))
}

pub async fn delete_campaign(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    state.campaigns.delete(id).await?;
    Ok(message("Campaign deleted successfully"))
}
