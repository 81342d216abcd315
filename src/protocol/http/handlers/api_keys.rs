use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::protocol::http::errors::ApiResult;
use crate::protocol::http::extract::AdminContext;
use crate::protocol::http::AppState;

/// POST /api/admin/generate-apikey
///
/// Rotates the key of the admin's own tenant. The body is ignored.
pub async fn generate_api_key_handler(
    State(app_state): State<AppState>,
    admin: AdminContext,
) -> ApiResult<Json<Value>> {
    let record = app_state.app.api_keys.generate(&admin).await?;
    Ok(Json(json!({
        "success": true,
        "apiKey": record.api_key
    })))
}

/// GET /api/admin/get-apikey
pub async fn get_api_key_handler(State(app_state): State<AppState>, admin: AdminContext) -> ApiResult<Json<Value>> {
    let existing = app_state.app.api_keys.fetch_existing(&admin).await?;
    Ok(Json(json!({
        "success": true,
        "exists": existing.is_some(),
        "apiKey": existing.map(|record| record.api_key)
    })))
}
