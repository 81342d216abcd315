use crate::app::AppHandle;
use crate::auth::{edge_gate, EdgeGate};
use crate::protocol::{ProtocolConfig, ProtocolPlugin};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, State},
    http::{header, HeaderName, HeaderValue},
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub mod errors;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod schemas;

pub use errors::{ApiError, ApiResult};
pub use extract::AdminContext;
pub use middleware::{logging_middleware, request_id_middleware};

/// HTTP/JSON front end
pub struct HttpProtocol;

#[async_trait]
impl ProtocolPlugin for HttpProtocol {
    fn name(&self) -> &'static str {
        "http-rest"
    }

    async fn start(
        &self,
        app: AppHandle,
        config: ProtocolConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("Starting HTTP protocol plugin on {}", config.listen_addr);

        let router = create_router(AppState::new(app), config.request_timeout);

        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("HTTP server draining connections");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Router state
#[derive(Clone)]
pub struct AppState {
    pub app: AppHandle,
}

impl AppState {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl FromRef<AppState> for EdgeGate {
    fn from_ref(state: &AppState) -> Self {
        state.app.edge_gate()
    }
}

/// Build the full application router
pub fn create_router(app_state: AppState, request_timeout: Duration) -> Router {
    let gate = EdgeGate::from_ref(&app_state);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .merge(handlers::pages::routes())
        .nest("/api", create_api_routes())
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(request_id_middleware))
                .layer(from_fn(logging_middleware))
                .layer(security_header(header::X_FRAME_OPTIONS, "DENY"))
                .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                .layer(security_header(header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
                .layer(security_header(
                    HeaderName::from_static("permissions-policy"),
                    "camera=(), microphone=(), geolocation=()",
                ))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(from_fn_with_state(gate, edge_gate)),
        )
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

fn create_api_routes() -> Router<AppState> {
    use handlers::{api_keys, auth, client, feed, inventories, locations, operators};

    Router::new()
        // Public
        .route("/admin-login", post(auth::admin_login_handler))
        .route("/user-login", post(auth::user_login_handler))
        .route("/verify-token", post(auth::verify_token_handler))
        .route("/register-user", post(auth::register_user_handler))
        .route("/check-username", post(auth::check_username_handler))
        .route("/password-reset", post(auth::password_reset_handler))
        // API key
        .route("/admin/generate-apikey", post(api_keys::generate_api_key_handler))
        .route("/admin/get-apikey", get(api_keys::get_api_key_handler))
        .route("/scanandgo/inventory", get(feed::inventory_feed_handler))
        // Tenant resources
        .route("/users", get(operators::list_operators_handler))
        .route("/users/count", get(operators::count_operators_handler))
        .route(
            "/users/{id}",
            get(operators::get_operator_handler)
                .patch(operators::update_operator_handler)
                .delete(operators::delete_operator_handler),
        )
        .route("/users/{id}/reset-password", post(operators::reset_password_handler))
        .route(
            "/locations",
            get(locations::list_locations_handler).post(locations::create_location_handler),
        )
        .route(
            "/locations/{id}",
            put(locations::rename_location_handler).delete(locations::delete_location_handler),
        )
        .route(
            "/inventories",
            get(inventories::list_inventories_handler).post(inventories::create_inventory_handler),
        )
        .route(
            "/inventories/{id}",
            get(inventories::get_inventory_handler)
                .put(inventories::update_inventory_handler)
                .delete(inventories::delete_inventory_handler),
        )
        .route(
            "/client",
            get(client::get_client_handler).put(client::update_client_handler),
        )
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn readiness_handler(State(app_state): State<AppState>) -> ApiResult<Json<Value>> {
    match app_state.app.store().ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ready",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            Err(ApiError::Internal(format!("storage not ready: {}", e)))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::directory::StaticDirectory;
    use crate::auth::{DirectoryUser, Identity, Role, TenantId};
    use crate::config::SecurityConfig;
    use crate::storage::{MemoryStore, NewOperator, OperatorStore};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use tower::ServiceExt;

    pub const ADMIN_EMAIL: &str = "boss@example.com";
    pub const ADMIN_PASSWORD: &str = "directory-pw";

    /// Router over an in-memory store and a one-admin directory (id 7, active)
    pub struct TestApp {
        pub router: Router,
        pub handle: AppHandle,
        pub store: Arc<MemoryStore>,
    }

    impl TestApp {
        pub fn new() -> Self {
            Self::with_directory(StaticDirectory {
                users: vec![(
                    DirectoryUser {
                        id: 7,
                        email: Some(ADMIN_EMAIL.to_string()),
                        status: 1,
                    },
                    ADMIN_PASSWORD.to_string(),
                )],
                unavailable: false,
            })
        }

        pub fn with_directory(directory: StaticDirectory) -> Self {
            let store = Arc::new(MemoryStore::new());
            let security = SecurityConfig {
                jwt_secret: "router-test-secret".to_string(),
                secure_cookies: true,
            };
            let handle = AppHandle::new(store.clone(), Arc::new(directory), &security).unwrap();
            let router = create_router(AppState::new(handle.clone()), Duration::from_secs(5));
            Self { router, handle, store }
        }

        pub fn token(&self, tenant: i64, user_id: i64, role: Role) -> String {
            self.handle
                .auth
                .issue(&Identity {
                    tenant_id: Some(tenant),
                    user_id,
                    username: format!("user{}", user_id),
                    email: None,
                    role,
                    is_active: true,
                })
                .unwrap()
        }

        /// Create an operator and return its id with an agent token for it
        pub async fn seed_agent(&self, tenant: i64, username: &str) -> (i64, String) {
            let operator = self
                .store
                .create_operator(
                    TenantId::new(tenant).unwrap(),
                    NewOperator {
                        username: username.to_string(),
                        password_hash: "$argon2id$unused".to_string(),
                    },
                )
                .await
                .unwrap();
            (operator.id, self.token(tenant, operator.id, Role::Agent))
        }

        pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.router.clone().oneshot(request).await.unwrap()
        }

        pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let response = self.send(method, uri, token, body).await;
            let status = response.status();
            (status, body_json(response).await)
        }
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::auth::Role;
    use axum::http::{Method, StatusCode};

    #[test]
    fn test_http_protocol_name() {
        assert_eq!(HttpProtocol.name(), "http-rest");
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = TestApp::new();
        let (status, body) = app.json(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = app.json(Method::GET, "/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_security_headers_on_every_response() {
        let app = TestApp::new();
        for path in ["/health", "/admin/dashboard", "/api/users"] {
            let response = app.send(Method::GET, path, None, None).await;
            let headers = response.headers();
            assert_eq!(headers["x-frame-options"], "DENY");
            assert_eq!(headers["x-content-type-options"], "nosniff");
            assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
            assert_eq!(headers["permissions-policy"], "camera=(), microphone=(), geolocation=()");
        }
    }

    #[tokio::test]
    async fn test_agent_token_on_admin_page_logs_out() {
        let app = TestApp::new();
        let token = app.token(7, 3, Role::Agent);
        let response = app.send(Method::GET, "/admin/dashboard", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/");
        assert_eq!(response.headers()["x-session-cleanup"], "true");
    }
}
