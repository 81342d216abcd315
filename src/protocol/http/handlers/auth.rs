use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::access::auth_cookie;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{Identity, Role, SignInOutcome, TenantId};
use crate::protocol::http::errors::{ApiError, ApiResult};
use crate::protocol::http::schemas::{
    non_blank, AdminLoginRequest, LoginUser, PasswordResetRequest, RegisterUserRequest, UserLoginRequest,
    UsernameRequest, VerifyTokenRequest,
};
use crate::protocol::http::AppState;
use crate::storage::{NewOperator, StorageError};

/// POST /api/admin-login
///
/// Credentials are checked by the identity provider; the provider's
/// account id becomes both the user id and the tenant id.
pub async fn admin_login_handler(
    State(app_state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (non_blank(&request.email), non_blank(&request.password)) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };

    let directory = &app_state.app.directory;
    let outcome = directory.sign_in(email, password).await.map_err(|e| {
        warn!("Identity provider sign-in failed: {}", e);
        ApiError::ExternalUnavailable
    })?;

    match outcome {
        SignInOutcome::Accepted => {}
        SignInOutcome::UnknownAccount => return Err(ApiError::unauthenticated("Account not found")),
        SignInOutcome::WrongPassword => return Err(ApiError::unauthenticated("Incorrect password")),
        SignInOutcome::Rejected(status) => {
            warn!("Identity provider rejected admin login with status {}", status);
            return Err(ApiError::unauthenticated("Login failed"));
        }
    }

    let user = directory
        .find_user(email)
        .await
        .map_err(|e| {
            warn!("Identity provider lookup failed: {}", e);
            ApiError::ExternalUnavailable
        })?
        .ok_or_else(|| {
            warn!("Admin {} signed in but is missing from the user listing", email);
            ApiError::unauthenticated("Login failed")
        })?;

    if !user.is_active() {
        warn!("Inactive admin account {} refused", user.id);
        return Err(ApiError::unauthenticated("Account is inactive"));
    }
    let tenant = TenantId::new(user.id).ok_or_else(|| ApiError::unauthenticated("Login failed"))?;

    let username = user.email.clone().unwrap_or_else(|| email.to_string());
    let identity = Identity {
        tenant_id: Some(tenant.get()),
        user_id: user.id,
        username: username.clone(),
        email: Some(username),
        role: Role::Admin,
        is_active: true,
    };

    info!("Admin {} signed in for tenant {}", identity.user_id, tenant);
    login_response(&app_state, identity)
}

/// POST /api/user-login
pub async fn user_login_handler(
    State(app_state): State<AppState>,
    Json(request): Json<UserLoginRequest>,
) -> ApiResult<Response> {
    let (Some(username), Some(password)) = (non_blank(&request.username), non_blank(&request.password)) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };

    let Some(operator) = app_state.app.store().find_operator_by_username(username).await? else {
        return Err(ApiError::unauthenticated("This account is not registered."));
    };

    if !verify_password(password.to_string(), operator.password_hash.clone()).await? {
        warn!("Wrong password for operator {}", operator.id);
        return Err(ApiError::unauthenticated("Incorrect password."));
    }

    let identity = Identity {
        tenant_id: Some(operator.customer_id),
        user_id: operator.id,
        username: operator.username,
        email: None,
        role: Role::Agent,
        is_active: true,
    };

    info!("Operator {} signed in for tenant {}", identity.user_id, operator.customer_id);
    login_response(&app_state, identity)
}

fn login_response(app_state: &AppState, identity: Identity) -> ApiResult<Response> {
    let token = app_state.app.auth.issue(&identity)?;
    let cookie = auth_cookie(&token, app_state.app.secure_cookies);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "success": true,
            "message": "Login successful",
            "token": token,
            "user": LoginUser::from(&identity),
        })),
    )
        .into_response())
}

/// POST /api/verify-token
///
/// Answers whether a token still verifies. Rejected tokens get no payload.
pub async fn verify_token_handler(
    State(app_state): State<AppState>,
    Json(request): Json<VerifyTokenRequest>,
) -> Response {
    let Some(token) = request.token.as_deref().and_then(non_blank) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "valid": false, "message": "Token is required" })),
        )
            .into_response();
    };

    match app_state.app.auth.verify(token) {
        Some(claims) => Json(json!({ "valid": true, "payload": claims.identity })).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "valid": false }))).into_response(),
    }
}

/// POST /api/register-user
///
/// The operator joins the tenant of the admin account named in the
/// request, as resolved by the identity provider.
pub async fn register_user_handler(
    State(app_state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (Some(admin_email), Some(username), Some(password)) = (
        non_blank(&request.admin_email),
        non_blank(&request.username),
        non_blank(&request.password),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    let admin = app_state
        .app
        .directory
        .find_user(admin_email)
        .await
        .map_err(|e| {
            warn!("Identity provider lookup failed: {}", e);
            ApiError::ExternalUnavailable
        })?
        .filter(|admin| admin.is_active())
        .ok_or_else(|| ApiError::bad_request("Unknown admin account"))?;
    let tenant = TenantId::new(admin.id).ok_or_else(|| ApiError::bad_request("Unknown admin account"))?;

    let password_hash = hash_password(password.to_string()).await?;
    let operator = app_state
        .app
        .store()
        .create_operator(
            tenant,
            NewOperator {
                username: username.to_string(),
                password_hash,
            },
        )
        .await
        .map_err(|e| match e {
            StorageError::Duplicate(_) => ApiError::conflict("Username already exists"),
            other => other.into(),
        })?;

    info!("Operator {} registered in tenant {}", operator.id, tenant);
    Ok(Json(json!({
        "success": true,
        "message": "User registered successfully",
        "userId": operator.id
    })))
}

/// POST /api/check-username
pub async fn check_username_handler(
    State(app_state): State<AppState>,
    Json(request): Json<UsernameRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let username = non_blank(&request.username).ok_or_else(|| ApiError::bad_request("Username is required"))?;
    let exists = app_state.app.store().username_exists(username).await?;

    Ok(Json(json!({
        "exists": exists,
        "message": if exists { "Username already exists" } else { "Username is available" }
    })))
}

/// POST /api/password-reset
pub async fn password_reset_handler(
    State(app_state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let username = non_blank(&request.username).ok_or_else(|| ApiError::bad_request("Username is required"))?;
    let note = request.message.as_deref().and_then(non_blank).map(str::to_string);

    if !app_state.app.store().request_password_reset(username, note).await? {
        return Err(ApiError::not_found("This account is not registered."));
    }

    info!("Password reset requested for {}", username);
    Ok(Json(json!({
        "success": true,
        "message": "Password reset request submitted successfully. Please contact your administrator."
    })))
}
