use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::access::{cleared_auth_cookie, extract_token, is_valid_role_path};
use super::{AuthService, Role, SESSION_CLEANUP_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use crate::protocol::http::middleware::extract_client_ip;

/// State of the edge gate
#[derive(Clone)]
pub struct EdgeGate {
    auth: Arc<AuthService>,
    secure_cookies: bool,
}

impl EdgeGate {
    pub fn new(auth: Arc<AuthService>, secure_cookies: bool) -> Self {
        Self {
            auth,
            secure_cookies,
        }
    }
}

/// Edge request gate for the role areas (`/admin/*`, `/agent/*`)
///
/// Runs before any page handler. Requests outside the role areas pass
/// through untouched. Inside them the token must verify for the role owning
/// the path; otherwise the client is sent to `/` with its session cookie
/// cleared and told to purge local credentials.
pub async fn edge_gate(State(gate): State<EdgeGate>, mut request: Request, next: Next) -> Response {
    // Identity headers are only ever set here.
    request.headers_mut().remove(USER_ID_HEADER);
    request.headers_mut().remove(USER_ROLE_HEADER);

    let path = request.uri().path().to_string();
    let Some(required) = Role::for_path(&path) else {
        return next.run(request).await;
    };

    let token = extract_token(request.headers());
    let ctx = match gate.auth.authorize(token.as_deref(), required) {
        Ok(ctx) => ctx,
        Err(denied) => {
            let client_ip = extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
            warn!("Edge gate rejected {} from {}: {}", path, client_ip, denied);
            return logout_redirect(gate.secure_cookies);
        }
    };

    if !is_valid_role_path(ctx.role, &path) {
        debug!("Redirecting {} to its dashboard from {}", ctx.role, path);
        return Redirect::to(ctx.role.dashboard_path()).into_response();
    }

    let headers = request.headers_mut();
    headers.insert(USER_ID_HEADER, HeaderValue::from(ctx.user_id));
    headers.insert(USER_ROLE_HEADER, HeaderValue::from_static(ctx.role.as_str()));
    request.extensions_mut().insert(ctx);

    next.run(request).await
}

/// Redirect to `/`, expire the session cookie and ask the client to clean up
pub fn logout_redirect(secure_cookies: bool) -> Response {
    let mut response = Redirect::to("/").into_response();
    let headers = response.headers_mut();
    if let Ok(cookie) = HeaderValue::from_str(&cleared_auth_cookie(secure_cookies)) {
        headers.insert(header::SET_COOKIE, cookie);
    }
    headers.insert(SESSION_CLEANUP_HEADER, HeaderValue::from_static("true"));
    response
}
