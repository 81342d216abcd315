//! Role area pages
//!
//! Everything under `/admin` and `/agent` sits behind the edge gate, which
//! leaves the verified `AuthContext` in the request extensions.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Extension, Router,
};
use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::protocol::http::errors::ApiResult;
use crate::protocol::http::AppState;
use crate::storage::InventoryFilter;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(landing_handler))
        .route("/admin/dashboard", get(admin_dashboard_handler))
        .route("/agent/dashboard", get(agent_dashboard_handler))
        .route("/admin/{*page}", get(area_page_handler))
        .route("/agent/{*page}", get(area_page_handler))
}

async fn landing_handler() -> Json<Value> {
    Json(json!({
        "service": "scanassets",
        "login": {
            "admin": "/api/admin-login",
            "agent": "/api/user-login"
        }
    }))
}

async fn admin_dashboard_handler(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Value>> {
    let store = app_state.app.store();
    let operators = store.count_operators(ctx.tenant_id).await?;
    let locations = store.list_locations(ctx.tenant_id).await?;
    let inventories = store.list_inventories(ctx.tenant_id, &InventoryFilter::default()).await?;

    Ok(Json(json!({
        "page": "dashboard",
        "role": ctx.role,
        "customerId": ctx.tenant_id,
        "operators": operators,
        "locations": locations.len(),
        "inventories": inventories.len()
    })))
}

async fn agent_dashboard_handler(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Value>> {
    let locations = app_state.app.store().list_locations(ctx.tenant_id).await?;

    Ok(Json(json!({
        "page": "dashboard",
        "role": ctx.role,
        "customerId": ctx.tenant_id,
        "username": ctx.username,
        "locations": locations
    })))
}

async fn area_page_handler(Path(page): Path<String>, Extension(ctx): Extension<AuthContext>) -> Json<Value> {
    Json(json!({
        "page": page,
        "role": ctx.role,
        "customerId": ctx.tenant_id
    }))
}
