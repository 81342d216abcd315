use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::auth::access::cleared_auth_cookie;
use crate::auth::{AccessDenied, ApiKeyRejected, SESSION_CLEANUP_HEADER};
use crate::error::ScanAssetsError;
use crate::storage::StorageError;

/// Error returned by HTTP handlers
///
/// Renders as `{success: false, message, code}`. Server-side failures keep
/// their details in the logs and answer with a generic message.
#[derive(Debug)]
pub enum ApiError {
    /// No usable token. Body message is generic.
    Unauthenticated(String),
    /// Genuine token that may not be used here. Tells the client to purge it.
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InvalidApiKey,
    ExternalUnavailable,
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ExternalUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InvalidApiKey => "INVALID_API_KEY",
            ApiError::ExternalUnavailable => "EXTERNAL_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthenticated(msg)
            | ApiError::Forbidden(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg.clone(),
            ApiError::InvalidApiKey => ApiKeyRejected.to_string(),
            ApiError::ExternalUnavailable => "External authentication service unavailable".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("Request failed: {}", detail);
        }

        let status = self.status();
        let body = Json(json!({
            "success": false,
            "message": self.message(),
            "code": self.code(),
        }));
        let mut response = (status, body).into_response();

        if let ApiError::Forbidden(_) = self {
            let headers = response.headers_mut();
            headers.insert(SESSION_CLEANUP_HEADER, HeaderValue::from_static("true"));
            // Always Secure; the value is empty.
            if let Ok(cookie) = HeaderValue::from_str(&cleared_auth_cookie(true)) {
                headers.insert(header::SET_COOKIE, cookie);
            }
        }
        response
    }
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        if denied.forces_logout() {
            ApiError::Forbidden(denied.to_string())
        } else {
            ApiError::Unauthenticated(AccessDenied::InvalidToken.to_string())
        }
    }
}

impl From<ApiKeyRejected> for ApiError {
    fn from(_: ApiKeyRejected) -> Self {
        ApiError::InvalidApiKey
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate(what) => ApiError::Conflict(format!("{} already exists", what)),
            StorageError::InvalidReference(what) => ApiError::BadRequest(format!("Invalid {}", what)),
            StorageError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ScanAssetsError> for ApiError {
    fn from(err: ScanAssetsError) -> Self {
        match err {
            ScanAssetsError::Storage(e) => e.into(),
            ScanAssetsError::Auth(msg) => ApiError::Forbidden(msg),
            ScanAssetsError::Validation(msg) => ApiError::BadRequest(msg),
            ScanAssetsError::Network(_) => ApiError::ExternalUnavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
