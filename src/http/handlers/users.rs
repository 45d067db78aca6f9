//! `/api/users`

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::extract::{ApiJson, AuthUser};
use crate::services::auth::{Audience, AuthResponse, LoginRequest, OtpRequest, RegisterRequest};
use crate::services::discounts::{DiscountValidity, SubscribeRequest, ValidateDiscountRequest};
use crate::AppState;

pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request, Audience::Shopper, None).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login_user(State(state): State<AppState>, ApiJson(request): ApiJson<LoginRequest>) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request, false).await?))
}

/// Shared by `/api/users/verify-otp` and `/api/admins/verify-otp`.
pub async fn verify_otp(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(request): ApiJson<OtpRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth.verify_otp(&caller, request).await?))
}

/// The code itself only goes out by mail.
pub async fn subscribe(State(state): State<AppState>, ApiJson(request): ApiJson<SubscribeRequest>) -> Result<(StatusCode, Json<Value>)> {
    let code = state.discounts.subscribe(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Subscribed successfully. Check your email for your discount code.",
            "expires_at": code.expires_at,
        })),
    ))
}

pub async fn validate_discount(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ValidateDiscountRequest>,
) -> Result<Json<DiscountValidity>> {
    Ok(Json(state.discounts.validate(request).await?))
}
