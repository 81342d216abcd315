use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::parse_id;
use crate::auth::AuthContext;
use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::schemas::{non_blank, CreateInventoryRequest, InventoryQuery, UpdateInventoryRequest};
use crate::protocol::http::AppState;
use crate::storage::{InventoryFilter, InventoryUpdate, NewInventory};

/// GET /api/inventories?location_id=&search=
pub async fn list_inventories_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<Value>> {
    let filter = InventoryFilter {
        location_id: query.location_id,
        search: query.search,
        limit: query.limit,
        offset: query.offset,
    };
    let inventories = app_state.app.store().list_inventories(ctx.tenant_id, &filter).await?;

    Ok(Json(json!({
        "success": true,
        "total": inventories.len(),
        "inventories": inventories
    })))
}

/// POST /api/inventories
///
/// Registers a scanned item. A new catalogue asset is created in the same
/// write when a name is given; the location must belong to the caller's
/// tenant.
pub async fn create_inventory_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateInventoryRequest>,
) -> ApiResult<Json<Value>> {
    let rfid = non_blank(&request.rfid).ok_or_else(|| ApiError::bad_request("RFID is required"))?;

    // Agents record under their own operator id; admins are not operators.
    let operator_id = (!ctx.is_admin()).then_some(ctx.user_id);

    let record = app_state
        .app
        .store()
        .create_inventory(
            ctx.tenant_id,
            NewInventory {
                asset_id: None,
                asset_name: request.asset_name.as_deref().and_then(non_blank).map(str::to_string),
                location_id: request.location_id,
                operator_id,
                rfid: rfid.to_string(),
                status: request.status,
                comment: request.comment,
                purchase_amount: request.purchase_amount,
            },
        )
        .await?;

    info!("Inventory {} recorded in tenant {}", record.id, ctx.tenant_id);
    Ok(Json(json!({ "success": true, "inventory": record })))
}

/// GET /api/inventories/{id}
pub async fn get_inventory_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "inventory")?;
    let record = app_state
        .app
        .store()
        .get_inventory(ctx.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Inventory not found or not authorized"))?;
    Ok(Json(json!({ "success": true, "inventory": record })))
}

/// PUT /api/inventories/{id}
pub async fn update_inventory_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateInventoryRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "inventory")?;

    let update = InventoryUpdate {
        rfid: request.rfid.as_deref().and_then(non_blank).map(str::to_string),
        asset_name: request.asset_name.as_deref().and_then(non_blank).map(str::to_string),
        location_id: request.location_id,
        status: request.status,
        comment: request.comment,
    };
    let record = app_state
        .app
        .store()
        .update_inventory(ctx.tenant_id, id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Inventory not found or not authorized"))?;
    Ok(Json(json!({ "success": true, "inventory": record })))
}

/// DELETE /api/inventories/{id}
pub async fn delete_inventory_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "inventory")?;
    if !app_state.app.store().delete_inventory(ctx.tenant_id, id).await? {
        return Err(ApiError::not_found("Inventory not found or not authorized"));
    }

    info!("Inventory {} deleted from tenant {}", id, ctx.tenant_id);
    Ok(Json(json!({ "success": true, "message": "Inventory deleted successfully" })))
}
