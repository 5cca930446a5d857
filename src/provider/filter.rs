//! The regex-derived view over a parent `ProxySetProvider`.

use super::proxy_set::ProxySetProvider;
use super::{Provider, ProviderType, SubscriptionInfo, VehicleType};
use crate::outbound::OutboundProxy;
use crate::provider::healthcheck::HealthCheck;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Same delay used by `ProxySetProvider` when a previously-empty set
/// acquires its first entries and the parent itself isn't auto-probing.
const EMPTY_TO_POPULATED_PROBE_DELAY: Duration = Duration::from_secs(30);

/// Presents a name-filtered subset of a parent's proxies as its own
/// provider, with an independent health-check loop over just that subset.
pub struct FilterProvider {
    name: String,
    parent: Arc<ProxySetProvider>,
    regex: Option<Regex>,
    proxies: RwLock<Vec<Arc<dyn OutboundProxy>>>,
    health_check: Arc<HealthCheck>,
}

impl FilterProvider {
    pub fn new(
        name: impl Into<String>,
        parent: Arc<ProxySetProvider>,
        regex: Option<Regex>,
        health_check_url: impl Into<String>,
        health_check_interval: Duration,
        health_check_lazy: bool,
    ) -> Arc<Self> {
        Arc::new(FilterProvider {
            name: name.into(),
            parent,
            regex,
            proxies: RwLock::new(Vec::new()),
            health_check: Arc::new(HealthCheck::new(health_check_url, health_check_interval, health_check_lazy)),
        })
    }

    fn matches(&self, proxy: &Arc<dyn OutboundProxy>) -> bool {
        match &self.regex {
            Some(re) => re.is_match(proxy.name()),
            None => true,
        }
    }

    /// Rebuilds the filtered view from the parent's current proxies. Called
    /// whenever the parent replaces its own set, and once at construction.
    pub async fn update(&self) -> Result<()> {
        let filtered: Vec<Arc<dyn OutboundProxy>> = self
            .parent
            .proxies()
            .await
            .into_iter()
            .filter(|p| self.matches(p))
            .collect();

        *self.proxies.write().await = filtered.clone();
        self.health_check.close();
        self.health_check.set_proxies(filtered.clone()).await;

        if !filtered.is_empty() && self.health_check.is_auto() {
            self.health_check.spawn();
            if !self.parent.health_check_is_auto() {
                let hc = self.health_check.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(EMPTY_TO_POPULATED_PROBE_DELAY).await;
                    hc.check().await;
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Provider for FilterProvider {
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
        self.proxies.read().await.clone()
    }

    async fn count(&self) -> usize {
        self.proxies.read().await.len()
    }

    async fn update(&self) -> Result<()> {
        FilterProvider::update(self).await
    }

    async fn initial(&self) -> Result<()> {
        FilterProvider::update(self).await
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
        self.parent.updated_at().await
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
    use crate::outbound::DescriptorFactory;
    use crate::provider::vehicle::{Vehicle, VehicleRead};
    use crate::statistic::StatisticManager;
    use async_trait::async_trait as async_trait_test;

    struct OnceVehicle(&'static str);

    #[async_trait_test]
    impl Vehicle for OnceVehicle {
        async fn read(&self) -> Result<VehicleRead> {
            Ok(VehicleRead {
                bytes: self.0.as_bytes().to_vec(),
                digest: "d".to_string(),
                subscription_userinfo: None,
            })
        }

        fn path(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_filter_subset_of_parent() {
        let yaml = "proxies:\n  - name: HK-1\n    type: ss\n    server: 1.2.3.4\n    port: 443\n  - name: US-1\n    type: ss\n    server: 1.2.3.5\n    port: 443\n";
        let vehicle: Arc<dyn Vehicle> = Arc::new(OnceVehicle(yaml));
        let parent = ProxySetProvider::new(
            "parent",
            VehicleType::File,
            vehicle,
            Duration::from_secs(0),
            None,
            "",
            Arc::new(DescriptorFactory),
            "",
            Duration::from_secs(0),
            true,
            Arc::new(StatisticManager::new()),
        );
        parent.initial().await.unwrap();

        let filter = FilterProvider::new(
            "hk-only",
            parent,
            Some(Regex::new("^HK").unwrap()),
            "",
            Duration::from_secs(0),
            true,
        );
        filter.initial().await.unwrap();

        assert_eq!(filter.count().await, 1);
        assert_eq!(filter.proxies().await[0].name(), "HK-1");
    }
}
