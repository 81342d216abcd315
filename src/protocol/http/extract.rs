use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::ops::Deref;

use super::errors::ApiError;
use super::AppState;
use crate::auth::{extract_token, AuthContext, Role};

/// Any signed-in user of a tenant
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers);
        Ok(state.app.auth.identify(token.as_deref())?)
    }
}

/// Signed-in admin of a tenant
#[derive(Debug, Clone)]
pub struct AdminContext(pub AuthContext);

impl FromRequestParts<AppState> for AdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers);
        Ok(AdminContext(state.app.auth.authorize(token.as_deref(), Role::Admin)?))
    }
}

impl Deref for AdminContext {
    type Target = AuthContext;

    fn deref(&self) -> &AuthContext {
        &self.0
    }
}
