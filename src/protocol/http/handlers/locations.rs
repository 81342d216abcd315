use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::parse_id;
use crate::auth::AuthContext;
use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::schemas::{non_blank, LocationRequest};
use crate::protocol::http::AppState;
use crate::storage::{DeleteOutcome, StorageError};

fn duplicate_name(err: StorageError) -> ApiError {
    match err {
        StorageError::Duplicate(_) => ApiError::conflict("Location name already exists"),
        other => other.into(),
    }
}

/// GET /api/locations
pub async fn list_locations_handler(State(app_state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Value>> {
    let locations = app_state.app.store().list_locations(ctx.tenant_id).await?;
    Ok(Json(json!({ "locations": locations, "success": true })))
}

/// POST /api/locations
pub async fn create_location_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<LocationRequest>,
) -> ApiResult<Json<Value>> {
    let name = non_blank(&request.name).ok_or_else(|| ApiError::bad_request("Location name is required"))?;
    let location = app_state
        .app
        .store()
        .create_location(ctx.tenant_id, name)
        .await
        .map_err(duplicate_name)?;

    info!("Location {} created in tenant {}", location.id, ctx.tenant_id);
    Ok(Json(json!({ "location": location, "success": true })))
}

/// PUT /api/locations/{id}
pub async fn rename_location_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<LocationRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "location")?;
    let name = non_blank(&request.name).ok_or_else(|| ApiError::bad_request("Location name is required"))?;

    let location = app_state
        .app
        .store()
        .rename_location(ctx.tenant_id, id, name)
        .await
        .map_err(duplicate_name)?
        .ok_or_else(|| ApiError::not_found("Location not found"))?;
    Ok(Json(json!({ "location": location, "success": true })))
}

/// DELETE /api/locations/{id}
///
/// Refused with 409 while any inventory record sits at the location.
pub async fn delete_location_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "location")?;

    match app_state.app.store().delete_location(ctx.tenant_id, id).await? {
        DeleteOutcome::Deleted => {
            info!("Location {} deleted from tenant {}", id, ctx.tenant_id);
            Ok(Json(json!({ "success": true, "message": "Location deleted successfully" })))
        }
        DeleteOutcome::NotFound => Err(ApiError::not_found("Location not found")),
        DeleteOutcome::HasDependents(count) => Err(ApiError::conflict(format!(
            "Cannot delete location. It has {} associated assets.",
            count
        ))),
    }
}
