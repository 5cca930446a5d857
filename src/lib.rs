//! Runtime-managed proxy provider subsystem.
//!
//! Vehicles fetch raw subscription bytes, fetchers dedup and schedule those
//! fetches, parsers normalize three wire formats into a common mapping
//! shape, and the provider variants (root, static-list, filtered) expose the
//! resulting proxies with an independent health-check loop. The REST
//! control surface in `hub/` lists, refreshes and probes them.

pub mod common;
pub mod config;
pub mod hub;
pub mod outbound;
pub mod provider;
pub mod statistic;

pub use common::error::{Error, Result};
pub use config::Config;

use hub::AppState;
use provider::factory::build_proxy_set_provider;
use provider::{Provider, ProviderManager};
use statistic::StatisticManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wires a loaded [`Config`] into a running [`ProviderManager`] plus an
/// optional REST control surface.
pub struct Host {
    config: Arc<RwLock<Config>>,
    statistic: Arc<StatisticManager>,
    provider_manager: Arc<ProviderManager>,
    api_addr: Option<SocketAddr>,
    api_secret: String,
}

impl Host {
    /// Builds every configured proxy provider and loads it once.
    pub async fn new(config: Config) -> Result<Self> {
        info!("initializing proxy-provider v{}", VERSION);

        let api_addr = config
            .external_controller
            .as_ref()
            .and_then(|addr| addr.parse::<SocketAddr>().ok());
        let api_secret = config.secret.clone().unwrap_or_default();

        let statistic = Arc::new(StatisticManager::new());
        let provider_manager = Arc::new(ProviderManager::new());

        for (name, provider_config) in &config.proxy_providers {
            let provider = build_proxy_set_provider(
                name,
                provider_config,
                Arc::new(outbound::DescriptorFactory),
                statistic.clone(),
                None,
            )?;
            if let Err(e) = provider.initial().await {
                warn!("initial load of provider {} failed: {}", name, e);
            }
            provider_manager.add_proxy_provider(provider).await;
        }
        info!("loaded {} proxy providers", config.proxy_providers.len());

        Ok(Host {
            config: Arc::new(RwLock::new(config)),
            statistic,
            provider_manager,
            api_addr,
            api_secret,
        })
    }

    /// Starts the REST control surface (if `external-controller` is
    /// configured) and blocks until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        if let Some(addr) = self.api_addr {
            let state = self.app_state();
            let handle = tokio::spawn(async move {
                if let Err(e) = hub::start_server(state, addr).await {
                    warn!("control surface error: {}", e);
                }
            });
            handles.push(handle);
            info!("control surface listening on {}", addr);
        }

        tokio::signal::ctrl_c().await?;
        info!("received shutdown signal");

        for handle in handles {
            handle.abort();
        }
        self.provider_manager.close_all().await;

        Ok(())
    }

    fn app_state(&self) -> AppState {
        AppState::new(self.api_secret.clone(), self.config.clone(), self.provider_manager.clone())
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn statistic(&self) -> &Arc<StatisticManager> {
        &self.statistic
    }

    pub fn provider_manager(&self) -> &Arc<ProviderManager> {
        &self.provider_manager
    }

    pub fn secret(&self) -> &str {
        &self.api_secret
    }
}
