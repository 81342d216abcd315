use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
};
use tracing::debug;

use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::schemas::FeedQuery;
use crate::protocol::http::AppState;
use crate::storage::{InventoryFilter, InventoryRecord};

/// GET /api/scanandgo/inventory?customer_id=..&apikey=..
///
/// Read-only feed for external integrations. Every failure, including a
/// missing parameter or an unreachable key store, is the same 401 with
/// "The API key is invalid.".
pub async fn inventory_feed_handler(
    State(app_state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<InventoryRecord>>> {
    // An unparseable query string is rejected like any other bad credential.
    let query = query.map(|Query(query)| query).unwrap_or_default();

    let tenant = app_state
        .app
        .api_keys
        .consume(query.customer_id.as_deref(), query.apikey.as_deref())
        .await?;

    let records = app_state
        .app
        .store()
        .list_inventories(tenant, &InventoryFilter::default())
        .await
        .map_err(|e| ApiError::Internal(format!("feed query failed: {}", e)))?;

    debug!("Serving {} feed records to tenant {}", records.len(), tenant);
    Ok(Json(records))
}
