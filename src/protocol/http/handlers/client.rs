use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::AuthContext;
use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::schemas::{non_blank, ClientNameRequest};
use crate::protocol::http::AppState;

pub const DEFAULT_CLIENT_NAME: &str = "ScanAssets";

/// GET /api/client
pub async fn get_client_handler(State(app_state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Value>> {
    let name = app_state.app.store().get_client_name(ctx.tenant_id).await?;
    Ok(Json(json!({
        "clientname": name.unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
        "success": true,
        "customerId": ctx.tenant_id
    })))
}

/// PUT /api/client
pub async fn update_client_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<ClientNameRequest>,
) -> ApiResult<Json<Value>> {
    let name = non_blank(&request.clientname).ok_or_else(|| ApiError::bad_request("Client name is required"))?;
    app_state.app.store().set_client_name(ctx.tenant_id, name).await?;

    info!("Client name of tenant {} updated", ctx.tenant_id);
    Ok(Json(json!({
        "clientname": name,
        "success": true,
        "message": "Client name updated successfully"
    })))
}
