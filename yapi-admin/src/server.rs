//! Admin REST API server: axum router, shared state, CORS, auth gate.
//!
//! Grounded on `ando-admin/src/server.rs`'s `AppState`/`AdminServer`
//! wiring; the route tree itself is this gateway's own (§6's admin tree),
//! and the `ServeDir` dashboard fallback is dropped — the web admin UI is
//! out of scope, so this surface serves JSON only.

use crate::handlers;
use crate::middleware::require_admin_auth;
use axum::routing::{delete, get, post, put};
use axum::Router as AxumRouter;
use http::HeaderValue;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use yapi_auth::CredentialResolver;
use yapi_core::config::AdminConfig;
use yapi_observability::MetricsCollector;
use yapi_store::{ApiKeyStore, BindingStore, RuleCacheService, UpstreamCredentialStore, UserStore};

/// Shared state for every admin handler.
pub struct AdminState {
    pub config: AdminConfig,
    pub rule_cache: Arc<RuleCacheService>,
    pub users: Arc<dyn UserStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub upstreams: Arc<dyn UpstreamCredentialStore>,
    pub bindings: Arc<dyn BindingStore>,
    pub resolver: Arc<CredentialResolver>,
    pub metrics: Option<Arc<MetricsCollector>>,
    /// Path to the standalone-mode persistence file; `None` disables it
    /// (e.g. in tests, or when a real persistence DSN is configured).
    pub state_file: Option<PathBuf>,
}

pub struct AdminServer {
    config: AdminConfig,
    state: Arc<AdminState>,
}

impl AdminServer {
    pub fn new(state: Arc<AdminState>) -> Self {
        let config = state.config.clone();
        Self { config, state }
    }

    fn cors_layer(&self) -> CorsLayer {
        if self.config.cors_origins.is_empty() {
            CorsLayer::new()
        } else {
            let origins: Vec<HeaderValue> = self
                .config
                .cors_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
    }

    /// Build the full axum router (protected admin tree + public login/health
    /// + unauthenticated `/metrics`). Exposed so integration tests can drive
    /// the router directly via `tower::ServiceExt::oneshot` without binding
    /// a real socket.
    pub fn build_router(&self) -> AxumRouter {
        let protected = AxumRouter::new()
            .route("/rules", get(handlers::rules::list_rules))
            .route("/rules", post(handlers::rules::create_rule))
            .route("/rules/{id}", get(handlers::rules::get_rule))
            .route("/rules/{id}", put(handlers::rules::update_rule))
            .route("/rules/{id}", delete(handlers::rules::delete_rule))
            .route("/users", get(handlers::users::list_users))
            .route("/users", post(handlers::users::create_user))
            .route("/users/{id}", get(handlers::users::get_user))
            .route("/users/{id}", delete(handlers::users::delete_user))
            .route(
                "/users/{id}/api-keys",
                get(handlers::api_keys::list_api_keys_for_user),
            )
            .route(
                "/users/{id}/api-keys",
                post(handlers::api_keys::create_api_key),
            )
            .route("/api-keys/{id}", delete(handlers::api_keys::delete_api_key))
            .route(
                "/api-keys/{id}/binding",
                get(handlers::bindings::get_binding),
            )
            .route(
                "/api-keys/{id}/binding",
                put(handlers::bindings::put_binding),
            )
            .route(
                "/api-keys/{id}/binding",
                delete(handlers::bindings::delete_binding),
            )
            .route(
                "/users/{id}/upstreams",
                get(handlers::upstreams::list_upstreams_for_user),
            )
            .route(
                "/users/{id}/upstreams",
                post(handlers::upstreams::create_upstream),
            )
            .route("/upstreams/{id}", get(handlers::upstreams::get_upstream))
            .route("/upstreams/{id}", put(handlers::upstreams::update_upstream))
            .route(
                "/upstreams/{id}",
                delete(handlers::upstreams::delete_upstream),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.state),
                require_admin_auth,
            ));

        let public = AxumRouter::new()
            .route("/login", post(handlers::login::login))
            .route("/healthz", get(handlers::health::health_check));

        AxumRouter::new()
            .nest("/admin", protected.merge(public))
            .route("/metrics", get(handlers::health::metrics))
            .layer(self.cors_layer())
            .with_state(Arc::clone(&self.state))
    }

    pub async fn start(self) -> anyhow::Result<()> {
        if !self.config.enabled {
            info!("admin API disabled");
            return Ok(());
        }

        let addr = self.config.addr;
        let app = self.build_router();

        info!(%addr, "starting admin API");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
