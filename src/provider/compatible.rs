//! A static-list provider for proxies declared directly in configuration
//! rather than fetched from a vehicle.

use super::{Provider, ProviderType, SubscriptionInfo, VehicleType};
use crate::outbound::OutboundProxy;
use crate::provider::healthcheck::HealthCheck;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

const EMPTY_TO_POPULATED_PROBE_DELAY: Duration = Duration::from_secs(30);

/// Wraps a fixed, non-empty list of proxies. No vehicle, no fetcher: the
/// only moving part is the health-check loop.
pub struct CompatibleProvider {
    name: String,
    proxies: Vec<Arc<dyn OutboundProxy>>,
    health_check: Arc<HealthCheck>,
}

impl CompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        proxies: Vec<Arc<dyn OutboundProxy>>,
        health_check_url: impl Into<String>,
        health_check_interval: Duration,
        health_check_lazy: bool,
    ) -> Result<Arc<Self>> {
        if proxies.is_empty() {
            return Err(Error::config("compatible provider requires at least one proxy"));
        }
        let health_check = Arc::new(HealthCheck::new(health_check_url, health_check_interval, health_check_lazy));
        Ok(Arc::new(CompatibleProvider {
            name: name.into(),
            proxies,
            health_check,
        }))
    }
}

#[async_trait]
impl Provider for CompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Proxy
    }

    fn vehicle_type(&self) -> VehicleType {
        VehicleType::Compatible
    }

    async fn proxies(&self) -> Vec<Arc<dyn OutboundProxy>> {
        self.proxies.clone()
    }

    async fn count(&self) -> usize {
        self.proxies.len()
    }

    async fn update(&self) -> Result<()> {
        Ok(())
    }

    async fn initial(&self) -> Result<()> {
        self.health_check.set_proxies(self.proxies.clone()).await;
        if self.health_check.is_auto() {
            self.health_check.spawn();
            let hc = self.health_check.clone();
            tokio::spawn(async move {
                tokio::time::sleep(EMPTY_TO_POPULATED_PROBE_DELAY).await;
                hc.check().await;
            });
        }
        Ok(())
    }

    async fn health_check(&self) {
        self.health_check.check().await;
    }

    fn touch(&self) {
        self.health_check.touch();
    }

    fn health_check_url(&self) -> &str {
        self.health_check.url()
    }

    async fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn subscription_info(&self) -> Option<SubscriptionInfo> {
        None
    }

    async fn finalize(&self) {
        self.health_check.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::MockProxy;

    #[tokio::test]
    async fn test_rejects_empty_list() {
        let result = CompatibleProvider::new("empty", vec![], "", Duration::from_secs(0), true);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_holds_static_proxies() {
        let proxies: Vec<Arc<dyn OutboundProxy>> = vec![Arc::new(MockProxy::new("a", Some(1)))];
        let provider = CompatibleProvider::new("static", proxies, "", Duration::from_secs(0), true).unwrap();
        provider.initial().await.unwrap();
        assert_eq!(provider.count().await, 1);
        provider.update().await.unwrap();
        assert_eq!(provider.count().await, 1);
    }
}
