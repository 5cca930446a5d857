//! The proxy provider subsystem: vehicles, fetchers, parsers, health checks
//! and the provider variants built from them.

pub mod compatible;
pub mod factory;
pub mod fetcher;
pub mod filter;
pub mod healthcheck;
pub mod parser;
pub mod proxy_set;
pub mod vehicle;

pub use compatible::CompatibleProvider;
pub use factory::build_proxy_set_provider;
pub use fetcher::Fetcher;
pub use filter::FilterProvider;
pub use healthcheck::HealthCheck;
pub use proxy_set::ProxySetProvider;

use crate::outbound::OutboundProxy;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What a provider is for. Rule providers are an outer-tunnel concern; this
/// crate only ever constructs `ProviderType::Proxy` values, but the type
/// stays distinct for parity with the control-surface listing shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderType {
    Proxy,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Proxy => write!(f, "Proxy"),
        }
    }
}

/// How a provider's underlying proxies were sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleType {
    HTTP,
    File,
    Compatible,
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleType::HTTP => write!(f, "HTTP"),
            VehicleType::File => write!(f, "File"),
            VehicleType::Compatible => write!(f, "Compatible"),
        }
    }
}

/// Subscription quota/usage parsed from a `Subscription-Userinfo` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    pub expire: u64,
}

impl SubscriptionInfo {
    /// Parses `"upload=xxx; download=xxx; total=xxx; expire=xxx"`. Unknown
    /// keys are ignored; malformed numeric values default to zero rather
    /// than failing the whole header.
    pub fn parse(header: &str) -> Option<Self> {
        let mut info = SubscriptionInfo {
            upload: 0,
            download: 0,
            total: 0,
            expire: 0,
        };

        for part in header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value: u64 = value.trim().parse().unwrap_or(0);
                match key.trim().to_lowercase().as_str() {
                    "upload" => info.upload = value,
                    "download" => info.download = value,
                    "total" => info.total = value,
                    "expire" => info.expire = value,
                    _ => {}
                }
            }
        }

        Some(info)
    }
}

/// Contract shared by every provider variant: the root `ProxySetProvider`,
/// the static-list `CompatibleProvider`, and the regex-derived `FilterProvider`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    fn vehicle_type(&self) -> VehicleType;

    async fn proxies(&self) -> Vec<Arc<dyn OutboundProxy>>;

    async fn count(&self) -> usize;

    /// Forces an out-of-band refresh. A no-op for variants with nothing to
    /// fetch (`CompatibleProvider`).
    async fn update(&self) -> Result<()>;

    /// First load: populates the initial proxy set and starts any
    /// background loops (scheduled fetch, auto health-check).
    async fn initial(&self) -> Result<()>;

    async fn health_check(&self);

    /// Marks the provider as recently accessed, suppressing a lazy
    /// health-check skip on the next tick.
    fn touch(&self);

    fn health_check_url(&self) -> &str;

    async fn updated_at(&self) -> Option<DateTime<Utc>>;

    async fn subscription_info(&self) -> Option<SubscriptionInfo>;

    /// Tears down background loops. Cascades to any registered dependents.
    async fn finalize(&self);
}

/// Registry of named proxy providers.
pub struct ProviderManager {
    proxy_providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        ProviderManager {
            proxy_providers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_proxy_provider(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.proxy_providers.write().await.insert(name, provider);
    }

    pub async fn get_proxy_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.proxy_providers.read().await.get(name).cloned()
    }

    pub async fn proxy_providers(&self) -> HashMap<String, Arc<dyn Provider>> {
        self.proxy_providers.read().await.clone()
    }

    pub async fn update_all(&self) -> Result<()> {
        for provider in self.proxy_providers.read().await.values() {
            if let Err(e) = provider.update().await {
                tracing::warn!("failed to update proxy provider {}: {}", provider.name(), e);
            }
        }
        Ok(())
    }

    pub async fn close_all(&self) {
        for provider in self.proxy_providers.read().await.values() {
            provider.finalize().await;
        }
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::MockProxy;
    use std::time::Duration;

    #[test]
    fn test_subscription_info_parse() {
        let header = "upload=1234; download=5678; total=10000000; expire=1704067200";
        let info = SubscriptionInfo::parse(header).unwrap();

        assert_eq!(info.upload, 1234);
        assert_eq!(info.download, 5678);
        assert_eq!(info.total, 10000000);
        assert_eq!(info.expire, 1704067200);
    }

    #[test]
    fn test_vehicle_type_display() {
        assert_eq!(VehicleType::HTTP.to_string(), "HTTP");
        assert_eq!(VehicleType::File.to_string(), "File");
    }

    #[tokio::test]
    async fn test_provider_manager_add_and_get() {
        let manager = ProviderManager::new();
        let provider = CompatibleProvider::new(
            "mock",
            vec![Arc::new(MockProxy::new("a", Some(1)))],
            "",
            Duration::from_secs(0),
            true,
        )
        .unwrap();
        manager.add_proxy_provider(provider).await;

        assert!(manager.get_proxy_provider("mock").await.is_some());
        assert!(manager.get_proxy_provider("missing").await.is_none());
    }
}
