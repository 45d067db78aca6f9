//! `/api/admins`

use axum::{extract::State, http::StatusCode, Json};

use crate::error::Result;
use crate::http::extract::{ApiJson, MaybeAuthUser, SuperAdminUser};
use crate::services::auth::{Audience, AuthResponse, LoginRequest, RegisterRequest};
use crate::AppState;

pub async fn register_admin(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request, Audience::Staff, caller.claims()).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login_admin(State(state): State<AppState>, ApiJson(request): ApiJson<LoginRequest>) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request, true).await?))
}

pub async fn create_admin(
    State(state): State<AppState>,
    SuperAdminUser(caller): SuperAdminUser,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.create_admin(request).await?;
    tracing::info!(created_by = %caller.sub, account_id = %response.account.id, "Admin created");
    Ok((StatusCode::CREATED, Json(response)))
}
