pub mod admins;
pub mod analytics;
pub mod campaigns;
pub mod categories;
pub mod orders;
pub mod products;
pub mod users;

use axum::Json;
use serde_json::{json, Value};

pub(crate) fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}
