use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::parse_id;
use crate::auth::password::{hash_password, temporary_password};
use crate::auth::{AuthContext, Role};
use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::extract::AdminContext;
use crate::protocol::http::schemas::{non_blank, UpdateOperatorRequest};
use crate::protocol::http::AppState;
use crate::storage::{DeleteOutcome, OperatorUpdate};

/// GET /api/users
pub async fn list_operators_handler(State(app_state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Value>> {
    let operators = app_state.app.store().list_operators(ctx.tenant_id).await?;
    Ok(Json(json!({ "users": operators, "success": true })))
}

/// GET /api/users/count
pub async fn count_operators_handler(State(app_state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Value>> {
    let counts = app_state.app.store().count_operators(ctx.tenant_id).await?;
    Ok(Json(json!({
        "normal": counts.normal,
        "forgottenPassword": counts.forgotten_password,
        "total": counts.total,
        "success": true,
        "customerId": ctx.tenant_id
    })))
}

/// GET /api/users/{id}
pub async fn get_operator_handler(
    State(app_state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "user")?;
    let operator = app_state
        .app
        .store()
        .get_operator(ctx.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "user": operator, "success": true })))
}

/// PATCH /api/users/{id}
///
/// A new password clears the reset flag and ends the operator's sessions.
pub async fn update_operator_handler(
    State(app_state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateOperatorRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "user")?;

    let password_hash = match request.password.as_deref().and_then(non_blank) {
        Some(password) => Some(hash_password(password.to_string()).await?),
        None => None,
    };
    let password_changed = password_hash.is_some();

    let update = OperatorUpdate {
        is_password_request: request.is_password_request,
        password_hash,
    };
    let operator = app_state
        .app
        .store()
        .update_operator(admin.tenant_id, id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found or access denied"))?;

    if password_changed {
        app_state.app.auth.revoke_user(admin.tenant_id, operator.id, Role::Agent);
        info!("Password of operator {} changed by admin {}", operator.id, admin.user_id);
    }

    Ok(Json(json!({
        "user": operator,
        "success": true,
        "message": "User updated successfully"
    })))
}

/// DELETE /api/users/{id}
pub async fn delete_operator_handler(
    State(app_state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "user")?;

    match app_state.app.store().delete_operator(admin.tenant_id, id).await? {
        DeleteOutcome::Deleted => {
            app_state.app.auth.revoke_user(admin.tenant_id, id, Role::Agent);
            info!("Operator {} deleted from tenant {}", id, admin.tenant_id);
            Ok(Json(json!({ "success": true, "message": "User deleted successfully" })))
        }
        DeleteOutcome::NotFound => Err(ApiError::not_found("User not found or access denied")),
        DeleteOutcome::HasDependents(count) => Err(ApiError::conflict(format!(
            "Cannot delete user. It has {} associated inventory records.",
            count
        ))),
    }
}

/// POST /api/users/{id}/reset-password
pub async fn reset_password_handler(
    State(app_state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "user")?;

    let temp_password = temporary_password();
    let password_hash = hash_password(temp_password.clone()).await?;
    let operator = app_state
        .app
        .store()
        .reset_operator_password(admin.tenant_id, id, password_hash)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found or access denied"))?;

    app_state.app.auth.revoke_user(admin.tenant_id, operator.id, Role::Agent);
    info!("Password of operator {} reset by admin {}", operator.id, admin.user_id);

    Ok(Json(json!({
        "user": operator,
        "tempPassword": temp_password,
        "success": true,
        "message": format!("Password reset successfully. Temporary password: {}", temp_password)
    })))
}

#[cfg(test)]
mod tests {
    use crate::auth::password::hash_password;
    use crate::auth::{Role, TenantId};
    use crate::protocol::http::test_support::*;
    use crate::storage::{InventoryStore, NewInventory, NewOperator, OperatorStore};
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn seed(app: &TestApp, tenant: i64, username: &str) -> i64 {
        app.store
            .create_operator(
                TenantId::new(tenant).unwrap(),
                NewOperator {
                    username: username.to_string(),
                    password_hash: hash_password("pw".to_string()).await.unwrap(),
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_listing_is_tenant_scoped() {
        let app = TestApp::new();
        seed(&app, 7, "mine").await;
        let foreign = seed(&app, 8, "theirs").await;
        let agent = app.token(7, 100, Role::Agent);

        let (status, body) = app.json(Method::GET, "/api/users", Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        let users = body["users"].as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["username"], "mine");
        assert!(users[0].get("password_hash").is_none());

        let (status, _) = app
            .json(Method::GET, &format!("/api/users/{}", foreign), Some(&agent), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = app.json(Method::GET, "/api/users/count", Some(&agent), None).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["normal"], 1);
        assert_eq!(body["customerId"], 7);
    }

    #[tokio::test]
    async fn test_agents_cannot_manage_operators() {
        let app = TestApp::new();
        let id = seed(&app, 7, "desk").await;
        let agent = app.token(7, 100, Role::Agent);

        let (status, _) = app
            .json(Method::DELETE, &format!("/api/users/{}", id), Some(&agent), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(app.store.get_operator(TenantId::new(7).unwrap(), id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_password_change_revokes_sessions() {
        let app = TestApp::new();
        let id = seed(&app, 7, "desk").await;
        let admin = app.token(7, 7, Role::Admin);

        // Issued before the change, so it falls under the revocation cutoff.
        let old_token = app
            .handle
            .auth
            .issue(&crate::auth::Identity {
                tenant_id: Some(7),
                user_id: id,
                username: "desk".to_string(),
                email: None,
                role: Role::Agent,
                is_active: true,
            })
            .unwrap();
        assert!(app.handle.auth.verify(&old_token).is_some());

        let (status, body) = app
            .json(
                Method::PATCH,
                &format!("/api/users/{}", id),
                Some(&admin),
                Some(json!({ "password": "new-pw" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["is_password_request"], false);
        assert!(app.handle.auth.verify(&old_token).is_none());

        let (status, _) = app
            .json(Method::GET, "/api/users", Some(&old_token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reset_password_returns_working_temporary_password() {
        let app = TestApp::new();
        let id = seed(&app, 7, "desk").await;
        let admin = app.token(7, 7, Role::Admin);

        let (status, body) = app
            .json(
                Method::POST,
                &format!("/api/users/{}/reset-password", id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let temp = body["tempPassword"].as_str().unwrap().to_string();

        let (status, body) = app
            .json(
                Method::POST,
                "/api/user-login",
                None,
                Some(json!({ "username": "desk", "password": temp })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        // The reset revoked earlier sessions; the fresh login is not one of them.
        let token = body["token"].as_str().unwrap().to_string();
        assert!(app.handle.auth.verify(&token).is_some());
        let (status, _) = app.json(Method::GET, "/api/locations", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_guarded_by_inventory() {
        let app = TestApp::new();
        let id = seed(&app, 7, "desk").await;
        let admin = app.token(7, 7, Role::Admin);
        app.store
            .create_inventory(
                TenantId::new(7).unwrap(),
                NewInventory {
                    operator_id: Some(id),
                    rfid: "R1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (status, body) = app
            .json(Method::DELETE, &format!("/api/users/{}", id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Cannot delete user. It has 1 associated inventory records.");

        let (status, _) = app
            .json(Method::DELETE, "/api/users/not-a-number", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let app = TestApp::new();
        let codec = crate::auth::TokenCodec::new("router-test-secret").unwrap();
        let expired = codec
            .issue_at(
                &crate::auth::Identity {
                    tenant_id: Some(7),
                    user_id: 3,
                    username: "desk".to_string(),
                    email: None,
                    role: Role::Agent,
                    is_active: true,
                },
                Utc::now() - Duration::hours(13),
            )
            .unwrap();

        for token in [expired.as_str(), "not-a-token"] {
            let (status, body) = app.json(Method::GET, "/api/users", Some(token), None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["message"], "Invalid or expired token");
        }
    }
}
