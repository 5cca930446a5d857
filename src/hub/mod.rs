//! REST control surface over the provider subsystem.

mod common;
mod providers;

pub use common::{ApiError, ApiResult};

use crate::config::Config;
use crate::provider::ProviderManager;
use crate::{Result, VERSION};

use axum::{
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Bearer secret required on every request when non-empty.
    pub secret: String,
    pub config: Arc<RwLock<Config>>,
    pub provider_manager: Arc<ProviderManager>,
}

impl AppState {
    pub fn new(secret: String, config: Arc<RwLock<Config>>, provider_manager: Arc<ProviderManager>) -> Self {
        AppState {
            secret,
            config,
            provider_manager,
        }
    }
}

/// Rejects requests missing (or mismatching) the configured bearer secret.
/// A blank secret disables the check entirely, matching an unauthenticated
/// local control surface.
async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.secret.is_empty() {
        return Ok(next.run(req).await);
    }

    let expected = HeaderValue::from_str(&format!("Bearer {}", state.secret)).map_err(|_| StatusCode::UNAUTHORIZED)?;
    match req.headers().get(header::AUTHORIZATION) {
        Some(value) if value == expected => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Builds the router for the provider control surface.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(hello))
        .route("/version", get(version))
        .route("/providers/proxies", get(providers::get_proxy_providers))
        .route("/providers/proxies/:name", get(providers::get_proxy_provider))
        .route("/providers/proxies/:name", put(providers::update_proxy_provider))
        .route(
            "/providers/proxies/:name/healthcheck",
            get(providers::healthcheck_proxy_provider),
        )
        .route("/providers/proxies/:name/:proxy", get(providers::get_provider_proxy))
        .route(
            "/providers/proxies/:name/:proxy/healthcheck",
            get(providers::healthcheck_provider_proxy),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the control surface, blocking until the listener is closed.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = create_router(state);
    info!("starting control surface on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn hello() -> Json<Value> {
    Json(json!({ "hello": "proxy-provider" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": VERSION }))
}
