//! Turns a `ProviderConfig` into a live `ProxySetProvider`.

use super::proxy_set::ProxySetProvider;
use super::VehicleType as ProviderVehicleType;
use crate::config::ProviderConfig;
use crate::outbound::ProxyFactory;
use crate::provider::vehicle::{FileVehicle, HttpVehicle, UpstreamProxyLocator, Vehicle};
use crate::statistic::StatisticManager;
use crate::{Error, Result};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Builds the vehicle, compiles the filter, and assembles a
/// [`ProxySetProvider`] from a single `proxy-providers.<name>` entry.
pub fn build_proxy_set_provider(
    name: &str,
    config: &ProviderConfig,
    factory: Arc<dyn ProxyFactory>,
    statistic: Arc<StatisticManager>,
    proxy_locator: Option<Arc<dyn UpstreamProxyLocator>>,
) -> Result<Arc<ProxySetProvider>> {
    config.validate()?;

    let (vehicle_type, vehicle): (ProviderVehicleType, Arc<dyn Vehicle>) = match config.vehicle_type.as_str() {
        "file" => (ProviderVehicleType::File, Arc::new(FileVehicle::new(&config.path))),
        "http" => (
            ProviderVehicleType::HTTP,
            Arc::new(HttpVehicle::new(
                &config.url,
                config.url_proxy,
                config.header.clone(),
                proxy_locator,
            )),
        ),
        other => return Err(Error::vehicle_type(other)),
    };

    let filter = if config.filter.is_empty() {
        None
    } else {
        Some(Regex::new(&config.filter)?)
    };

    let hc_interval = if config.health_check.enable {
        config.health_check.interval
    } else {
        0
    };

    Ok(ProxySetProvider::new(
        name,
        vehicle_type,
        vehicle,
        Duration::from_secs(config.interval_secs()),
        filter,
        config.prefix_name.clone(),
        factory,
        config.health_check.url.clone(),
        Duration::from_secs(hc_interval),
        config.health_check.lazy,
        statistic,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::DescriptorFactory;
    use crate::provider::Provider;

    #[test]
    fn test_rejects_unknown_vehicle_type() {
        let config = ProviderConfig {
            vehicle_type: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let err = build_proxy_set_provider(
            "test",
            &config,
            Arc::new(DescriptorFactory),
            Arc::new(StatisticManager::new()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::VehicleType(_)));
    }

    #[test]
    fn test_builds_file_provider() {
        let config = ProviderConfig {
            vehicle_type: "file".to_string(),
            path: "./providers/sub.yaml".to_string(),
            ..Default::default()
        };
        let provider = build_proxy_set_provider(
            "test",
            &config,
            Arc::new(DescriptorFactory),
            Arc::new(StatisticManager::new()),
            None,
        )
        .unwrap();
        assert_eq!(provider.name(), "test");
    }
}
