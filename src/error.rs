//! HTTP-facing error type.
//!
//! Every handler returns `Result<T, AppError>`. Business failures carry their
//! message to the client verbatim; storage and other internal failures are logged
//! and reported as a generic message.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{AuthError, CampaignError, CartError, CatalogError, DiscountError, OrderError};
use crate::domain::value_objects::ValueError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Business rule rejected the request: stock, discount state, duplicates.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// A downstream collaborator (mail relay) failed.
    #[error("{0}")]
    BadGateway(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(conflict) => Self::Conflict(conflict.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<ValueError> for AppError {
    fn from(err: ValueError) -> Self { Self::Validation(err.to_string()) }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::ProductNotFound(_) | OrderError::NotFound => Self::NotFound(message),
            OrderError::InsufficientStock { .. }
            | OrderError::InsufficientSizeStock { .. }
            | OrderError::StockConflict(_)
            | OrderError::Discount(_) => Self::Conflict(message),
            _ => Self::Validation(message),
        }
    }
}

impl From<DiscountError> for AppError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::InvalidEmail => Self::Validation(err.to_string()),
            _ => Self::Conflict(err.to_string()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ProductNotFound | CartError::ItemNotFound => Self::NotFound(err.to_string()),
            _ => Self::Validation(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let message = err.to_string();
        match err {
            CatalogError::ProductNotFound
            | CatalogError::CategoryNotFound
            | CatalogError::ParentNotFound
            | CatalogError::EmptyCategory => Self::NotFound(message),
            CatalogError::DuplicateProductCode(_)
            | CatalogError::HasSubcategories(_)
            | CatalogError::HasProducts(_)
            | CatalogError::AlreadyReviewed => Self::Conflict(message),
            _ => Self::Validation(message),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::EmailTaken => Self::Conflict(message),
            AuthError::UnknownEmail | AuthError::AccountNotFound => Self::NotFound(message),
            AuthError::WrongPassword | AuthError::InvalidOtp | AuthError::MissingToken | AuthError::InvalidToken => {
                Self::Unauthorized(message)
            }
            AuthError::NotAdmin | AuthError::SuperAdminRequired => Self::Forbidden(message),
            AuthError::Hash(_) | AuthError::Token(_) => Self::Internal(message),
            _ => Self::Validation(message),
        }
    }
}

impl From<CampaignError> for AppError {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::NotFound => Self::NotFound(err.to_string()),
            CampaignError::Delivery => Self::BadGateway(err.to_string()),
            _ => Self::Conflict(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Report the first failing field's message.
        let message = errors
            .field_errors()
            .into_values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid request".to_string());
        Self::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Conflict;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(OrderError::NoProducts).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(OrderError::ProductNotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(AuthError::WrongPassword).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::UnknownEmail).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(AuthError::SuperAdminRequired).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(CampaignError::AlreadySent).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_conflicts_are_client_errors() {
        let err = AppError::from(StoreError::Conflict(Conflict::DiscountUnavailable));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid or expired discount code");
        let err = AppError::from(StoreError::Corrupt("role: x".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_messages_pass_through() {
        let err = AppError::from(OrderError::InsufficientStock { product: "Linen Shirt".into(), available: 2 });
        assert_eq!(err.to_string(), "Product Linen Shirt has only 2 units in stock");
    }
}
