//! The root provider variant: fetched from a vehicle, parsed, and exposed.

use super::fetcher::Fetcher;
use super::filter::FilterProvider;
use super::healthcheck::HealthCheck;
use super::parser::parse_and_normalize;
use super::vehicle::Vehicle;
use super::{Provider, ProviderType, SubscriptionInfo, VehicleType};
use crate::outbound::{OutboundProxy, ProxyFactory};
use crate::statistic::StatisticManager;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};

/// Heuristic delay before probing a provider that just transitioned from
/// empty to populated, giving dependent filter providers time to attach.
pub const EMPTY_TO_POPULATED_PROBE_DELAY: Duration = Duration::from_secs(30);

pub struct ProxySetProvider {
    name: String,
    vehicle_type: VehicleType,
    proxies: RwLock<Vec<Arc<dyn OutboundProxy>>>,
    health_check: Arc<HealthCheck>,
    fetcher: OnceCell<Arc<Fetcher<Vec<Arc<dyn OutboundProxy>>>>>,
    subscription_info: RwLock<Option<SubscriptionInfo>>,
    updated_at: RwLock<Option<DateTime<Utc>>>,
    dependents: Mutex<Vec<Weak<FilterProvider>>>,
    statistic: Arc<StatisticManager>,
}

impl ProxySetProvider {
    /// `vehicle_type` distinguishes File/HTTP for display only; the fetch
    /// mechanics are identical because both are [`Vehicle`] implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        vehicle_type: VehicleType,
        vehicle: Arc<dyn Vehicle>,
        interval: Duration,
        filter: Option<Regex>,
        prefix_name: impl Into<String>,
        factory: Arc<dyn ProxyFactory>,
        health_check_url: impl Into<String>,
        health_check_interval: Duration,
        health_check_lazy: bool,
        statistic: Arc<StatisticManager>,
    ) -> Arc<Self> {
        let name = name.into();
        let prefix_name = prefix_name.into();
        let health_check = Arc::new(HealthCheck::new(health_check_url, health_check_interval, health_check_lazy));

        let provider = Arc::new(ProxySetProvider {
            name: name.clone(),
            vehicle_type,
            proxies: RwLock::new(Vec::new()),
            health_check,
            fetcher: OnceCell::new(),
            subscription_info: RwLock::new(None),
            updated_at: RwLock::new(None),
            dependents: Mutex::new(Vec::new()),
            statistic,
        });

        let weak = Arc::downgrade(&provider);
        let parser_factory = factory.clone();
        let parser: super::fetcher::ParseFn<Vec<Arc<dyn OutboundProxy>>> = Arc::new(move |bytes| {
            let mappings = parse_and_normalize(&bytes, filter.as_ref(), &prefix_name)?;
            mappings
                .iter()
                .map(|m| parser_factory.build(m))
                .collect::<Result<Vec<_>>>()
        });

        let on_update: super::fetcher::OnUpdate<Vec<Arc<dyn OutboundProxy>>> = Arc::new(move |new| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(provider) = weak.upgrade() {
                    provider.apply_update(new).await;
                }
            })
        });

        let file_backed = matches!(vehicle_type, VehicleType::File);
        let fetcher = Arc::new(Fetcher::new(name, vehicle, interval, file_backed, parser, on_update));
        let _ = provider.fetcher.set(fetcher);
        provider
    }

    fn fetcher(&self) -> &Arc<Fetcher<Vec<Arc<dyn OutboundProxy>>>> {
        self.fetcher.get().expect("fetcher initialized in new()")
    }

    /// Registers a filter provider so it is notified and finalized alongside this one.
    pub fn register_dependent(&self, dependent: Weak<FilterProvider>) {
        self.dependents.lock().unwrap().push(dependent);
    }

    /// Whether this provider's own health-check loop is auto (interval-driven).
    /// A dependent [`FilterProvider`] consults this to decide whether it needs
    /// to schedule its own delayed post-populate probe.
    pub fn health_check_is_auto(&self) -> bool {
        self.health_check.is_auto()
    }

    /// Core replacement algorithm: swap the slice, push it to the health
    /// checker, notify dependents, and retire anything that fell out.
    async fn apply_update(&self, new: Vec<Arc<dyn OutboundProxy>>) {
        let old = {
            let mut guard = self.proxies.write().await;
            std::mem::replace(&mut *guard, new.clone())
        };

        self.health_check.set_proxies(new).await;

        let dependents: Vec<_> = self
            .dependents
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| d.upgrade())
            .collect();
        for dependent in dependents {
            tokio::spawn(async move {
                let _ = dependent.update().await;
            });
        }

        if !old.is_empty() {
            let names: Vec<String> = old.iter().map(|p| p.name().to_string()).collect();
            self.statistic.kick_out_all(names);

            let cleanup_targets = old;
            tokio::spawn(async move {
                for proxy in cleanup_targets {
                    proxy.cleanup().await;
                }
            });

            let hc = self.health_check.clone();
            tokio::spawn(async move {
                hc.check().await;
            });
        } else if self.health_check.is_auto() {
            let hc = self.health_check.clone();
            tokio::spawn(async move {
                tokio::time::sleep(EMPTY_TO_POPULATED_PROBE_DELAY).await;
                hc.check().await;
            });
        }
    }
}

#[async_trait]
impl Provider for ProxySetProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Proxy
    }

    fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    async fn proxies(&self) -> Vec<Arc<dyn OutboundProxy>> {
        self.proxies.read().await.clone()
    }

    async fn count(&self) -> usize {
        self.proxies.read().await.len()
    }

    async fn update(&self) -> Result<()> {
        if let Some(new) = self.fetcher().try_update().await? {
            self.apply_update(new).await;
        }
        Ok(())
    }

    async fn initial(&self) -> Result<()> {
        let new = self.fetcher().initial().await?;
        self.apply_update(new).await;
        self.fetcher().start();
        self.health_check.spawn();
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
        *self.updated_at.read().await
    }

    async fn subscription_info(&self) -> Option<SubscriptionInfo> {
        self.subscription_info.read().await.clone()
    }

    async fn finalize(&self) {
        self.health_check.close();
        self.fetcher().destroy();
        let dependents: Vec<_> = self
            .dependents
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| d.upgrade())
            .collect();
        for dependent in dependents {
            dependent.finalize().await;
        }
    }
}
