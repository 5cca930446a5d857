//! `/providers/proxies` endpoints: list, inspect, refresh, and health-check
//! the configured proxy providers.

use super::common::{ApiError, ApiResult};
use super::AppState;
use crate::provider::Provider;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

async fn format_proxy_provider(provider: &dyn Provider) -> Value {
    let proxies: Vec<Value> = provider
        .proxies()
        .await
        .iter()
        .map(|p| {
            json!({
                "name": p.name(),
                "type": p.proxy_type().to_string(),
            })
        })
        .collect();

    let mut result = json!({
        "name": provider.name(),
        "type": provider.provider_type().to_string(),
        "vehicleType": provider.vehicle_type().to_string(),
        "proxies": proxies,
        "testUrl": provider.health_check_url(),
    });

    if let Some(info) = provider.subscription_info().await {
        result["subscriptionInfo"] = json!({
            "upload": info.upload,
            "download": info.download,
            "total": info.total,
            "expire": info.expire,
        });
    }

    if let Some(updated) = provider.updated_at().await {
        result["updatedAt"] = json!(updated.to_rfc3339());
    }

    result
}

/// `GET /providers/proxies`
pub async fn get_proxy_providers(State(state): State<AppState>) -> Json<Value> {
    let providers = state.provider_manager.proxy_providers().await;

    let mut providers_map = serde_json::Map::new();
    for (name, provider) in providers.iter() {
        providers_map.insert(name.clone(), format_proxy_provider(provider.as_ref()).await);
    }

    Json(json!({ "providers": providers_map }))
}

/// `GET /providers/proxies/:name`
pub async fn get_proxy_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    debug!("get proxy provider: {}", name);

    let provider = state
        .provider_manager
        .get_proxy_provider(&name)
        .await
        .ok_or_else(|| ApiError::not_found("provider"))?;

    Ok(Json(format_proxy_provider(provider.as_ref()).await))
}

/// `PUT /providers/proxies/:name` — forces an out-of-band refresh. A fetch
/// failure is reported as 503 rather than 500: the provider itself is fine,
/// its upstream just didn't answer.
pub async fn update_proxy_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    debug!("update proxy provider: {}", name);

    let provider = state
        .provider_manager
        .get_proxy_provider(&name)
        .await
        .ok_or_else(|| ApiError::not_found("provider"))?;

    provider
        .update()
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /providers/proxies/:name/healthcheck` — probes every proxy in the provider.
pub async fn healthcheck_proxy_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    debug!("health check proxy provider: {}", name);

    let provider = state
        .provider_manager
        .get_proxy_provider(&name)
        .await
        .ok_or_else(|| ApiError::not_found("provider"))?;

    provider.health_check().await;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /providers/proxies/:name/:proxy`
pub async fn get_provider_proxy(
    State(state): State<AppState>,
    Path((provider_name, proxy_name)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    debug!("get proxy {} from provider {}", proxy_name, provider_name);

    let provider = state
        .provider_manager
        .get_proxy_provider(&provider_name)
        .await
        .ok_or_else(|| ApiError::not_found("provider"))?;

    let proxies = provider.proxies().await;
    let proxy = proxies
        .iter()
        .find(|p| p.name() == proxy_name)
        .ok_or_else(|| ApiError::not_found("proxy"))?;

    Ok(Json(json!({
        "name": proxy.name(),
        "type": proxy.proxy_type().to_string(),
    })))
}

/// `GET /providers/proxies/:name/:proxy/healthcheck` — probes a single proxy
/// against a caller-supplied URL and reports its latency in milliseconds.
pub async fn healthcheck_provider_proxy(
    State(state): State<AppState>,
    Path((provider_name, proxy_name)): Path<(String, String)>,
    Query(params): Query<ProbeParams>,
) -> ApiResult<Json<Value>> {
    debug!(
        "health check proxy {} from provider {} against {}",
        proxy_name, provider_name, params.url
    );

    let provider = state
        .provider_manager
        .get_proxy_provider(&provider_name)
        .await
        .ok_or_else(|| ApiError::not_found("provider"))?;

    let proxies = provider.proxies().await;
    let proxy = proxies
        .iter()
        .find(|p| p.name() == proxy_name)
        .ok_or_else(|| ApiError::not_found("proxy"))?;

    let timeout = std::time::Duration::from_millis(params.timeout);
    let delay = proxy
        .url_test(&params.url, timeout)
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

    Ok(Json(json!({ "delay": delay })))
}
