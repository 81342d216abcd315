//! Access decision
//!
//! Pure functions shared by the edge gate and the request extractors:
//! where the token comes from, what a verified claim set is allowed to do,
//! and how the session cookie is written and cleared.

use axum::http::{header, HeaderMap};

use super::{AccessDenied, AuthContext, Role, TenantId, TokenClaims, AUTH_COOKIE, TOKEN_TTL_SECS};

/// Extract the identity token from a request.
///
/// `Authorization: Bearer` wins over the `auth-token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Decide whether verified claims grant access.
///
/// `claims` is `None` when the token failed verification. `required` is
/// `None` for resources open to both roles.
pub fn evaluate(
    claims: Option<TokenClaims>,
    required: Option<Role>,
    is_revoked: impl FnOnce(&TokenClaims) -> bool,
) -> Result<AuthContext, AccessDenied> {
    let claims = claims.ok_or(AccessDenied::InvalidToken)?;

    if is_revoked(&claims) {
        return Err(AccessDenied::Revoked);
    }

    let tenant_id = claims
        .identity
        .tenant_id
        .and_then(TenantId::new)
        .ok_or(AccessDenied::MissingTenant)?;

    if !claims.identity.is_active {
        return Err(AccessDenied::Inactive);
    }

    let role = claims.identity.role;
    if let Some(required) = required {
        if role != required {
            return Err(AccessDenied::RoleMismatch {
                required,
                actual: role,
            });
        }
    }

    Ok(AuthContext {
        tenant_id,
        user_id: claims.identity.user_id,
        username: claims.identity.username,
        email: claims.identity.email,
        role,
        is_active: true,
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}

/// Whether `path` lies inside the area owned by `role`
pub fn is_valid_role_path(role: Role, path: &str) -> bool {
    Role::for_path(path) == Some(role)
}

/// `Set-Cookie` value storing a freshly issued token
pub fn auth_cookie(token: &str, secure: bool) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Strict{}",
        AUTH_COOKIE,
        token,
        TOKEN_TTL_SECS,
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value expiring the token cookie immediately
pub fn cleared_auth_cookie(secure: bool) -> String {
    format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; SameSite=Strict{}",
        AUTH_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use axum::http::HeaderValue;

    fn claims(role: Role, tenant: Option<i64>, active: bool) -> TokenClaims {
        TokenClaims {
            identity: Identity {
                tenant_id: tenant,
                user_id: 3,
                username: "alice".to_string(),
                email: None,
                role,
                is_active: active,
            },
            iat: 1_700_000_000,
            exp: 1_700_043_200,
            iat_ms: None,
        }
    }

    #[test]
    fn test_bearer_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(header::COOKIE, HeaderValue::from_static("auth-token=cookie-token"));
        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn test_cookie_token_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth-token=abc.def.ghi; lang=fr"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        headers.insert(header::COOKIE, HeaderValue::from_static("auth-token="));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_evaluate_grants_matching_role() {
        let ctx = evaluate(Some(claims(Role::Admin, Some(9), true)), Some(Role::Admin), |_| false)
            .unwrap();
        assert_eq!(ctx.tenant_id.get(), 9);
        assert_eq!(ctx.role, Role::Admin);
        assert_eq!(ctx.username, "alice");
    }

    #[test]
    fn test_evaluate_denials() {
        assert_eq!(
            evaluate(None, Some(Role::Admin), |_| false),
            Err(AccessDenied::InvalidToken)
        );
        assert_eq!(
            evaluate(Some(claims(Role::Agent, Some(9), true)), Some(Role::Admin), |_| false),
            Err(AccessDenied::RoleMismatch {
                required: Role::Admin,
                actual: Role::Agent
            })
        );
        assert_eq!(
            evaluate(Some(claims(Role::Admin, Some(9), false)), Some(Role::Admin), |_| false),
            Err(AccessDenied::Inactive)
        );
        assert_eq!(
            evaluate(Some(claims(Role::Admin, None, true)), None, |_| false),
            Err(AccessDenied::MissingTenant)
        );
        assert_eq!(
            evaluate(Some(claims(Role::Admin, Some(0), true)), None, |_| false),
            Err(AccessDenied::MissingTenant)
        );
        assert_eq!(
            evaluate(Some(claims(Role::Admin, Some(9), true)), None, |_| true),
            Err(AccessDenied::Revoked)
        );
    }

    #[test]
    fn test_role_paths() {
        assert!(is_valid_role_path(Role::Admin, "/admin/location"));
        assert!(is_valid_role_path(Role::Agent, "/agent"));
        assert!(!is_valid_role_path(Role::Agent, "/admin/dashboard"));
        assert!(!is_valid_role_path(Role::Admin, "/"));
    }

    #[test]
    fn test_cookie_strings() {
        let set = auth_cookie("tok", true);
        assert!(set.starts_with("auth-token=tok;"));
        assert!(set.contains("Max-Age=43200"));
        assert!(set.contains("SameSite=Strict"));
        assert!(set.ends_with("; Secure"));

        let cleared = cleared_auth_cookie(false);
        assert!(cleared.starts_with("auth-token=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }
}
