use serde::{Deserialize, Serialize};

use crate::auth::{Identity, Role};

/// Admin login through the external identity provider
#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Agent login against the operators table
#[derive(Debug, Clone, Deserialize)]
pub struct UserLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Summary of the signed-in user returned next to a fresh token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub customer_id: i64,
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

impl From<&Identity> for LoginUser {
    fn from(identity: &Identity) -> Self {
        Self {
            customer_id: identity.tenant_id.unwrap_or_default(),
            id: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Agent self-registration. The tenant comes from the admin account named
/// by `admin_email`; any tenant id in the body is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsernameRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub username: String,
    /// Free-text note left for the admin
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperatorRequest {
    #[serde(default)]
    pub is_password_request: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryQuery {
    pub location_id: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInventoryRequest {
    #[serde(default)]
    pub rfid: String,
    pub asset_name: Option<String>,
    pub location_id: Option<i64>,
    pub status: Option<String>,
    pub comment: Option<String>,
    pub purchase_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateInventoryRequest {
    pub rfid: Option<String>,
    pub asset_name: Option<String>,
    pub location_id: Option<i64>,
    pub status: Option<String>,
    pub comment: Option<String>,
}

/// Raw feed query. Both values stay strings so every malformed input takes
/// the same rejection path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub customer_id: Option<String>,
    pub apikey: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientNameRequest {
    #[serde(default)]
    pub clientname: String,
}

/// Trimmed value, or `None` when blank
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_ignores_body_tenant() {
        let request: RegisterUserRequest = serde_json::from_str(
            r#"{"adminEmail":"boss@example.com","username":"desk","password":"pw","customerId":999}"#,
        )
        .unwrap();
        assert_eq!(request.admin_email, "boss@example.com");
        assert_eq!(request.username, "desk");
    }

    #[test]
    fn test_login_user_shape() {
        let identity = Identity {
            tenant_id: Some(4),
            user_id: 9,
            username: "desk".to_string(),
            email: None,
            role: Role::Agent,
            is_active: true,
        };
        let json = serde_json::to_value(LoginUser::from(&identity)).unwrap();
        assert_eq!(json["customerId"], 4);
        assert_eq!(json["role"], "agent");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  Depot "), Some("Depot"));
        assert_eq!(non_blank("   "), None);
    }
}
