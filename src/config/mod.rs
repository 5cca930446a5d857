//! Configuration: the host-level config plus the per-provider schema.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// Top-level configuration for the demo host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the control surface binds to.
    #[serde(rename = "external-controller")]
    pub external_controller: Option<String>,

    /// Bearer secret required by the control surface, if any.
    pub secret: Option<String>,

    /// Log level.
    #[serde(default = "default_log_level", rename = "log-level")]
    pub log_level: Option<String>,

    /// Named proxy providers, keyed by provider name.
    #[serde(default, rename = "proxy-providers")]
    pub proxy_providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            external_controller: None,
            secret: None,
            log_level: default_log_level(),
            proxy_providers: HashMap::new(),
        }
    }
}

fn default_log_level() -> Option<String> {
    Some("info".to_string())
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load_async<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.proxy_providers {
            provider
                .validate()
                .map_err(|e| Error::config(format!("proxy-providers.{name}: {e}")))?;
        }
        Ok(())
    }
}

/// Health-check sub-schema, nested under a provider's `health-check` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enable: bool,
    pub url: String,
    pub interval: u64,
    pub lazy: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            enable: false,
            url: String::new(),
            interval: 0,
            lazy: true,
        }
    }
}

/// The `proxy-providers.<name>` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// "file" | "http"
    #[serde(rename = "type")]
    pub vehicle_type: String,

    /// Local cache path (always resolved; used as the vehicle path for
    /// `file`, and as the cache destination for `http`).
    pub path: String,

    /// Subscription URL, required when `type` is `http`.
    pub url: String,

    /// Route the HTTP fetch itself through a named upstream proxy.
    #[serde(rename = "url-proxy")]
    pub url_proxy: bool,

    /// Fetch interval in seconds; 0 disables scheduled refresh.
    pub interval: i64,

    /// Optional regex filter applied to parsed entries.
    pub filter: String,

    #[serde(rename = "health-check")]
    pub health_check: HealthCheckConfig,

    #[serde(rename = "force-cert-verify")]
    pub force_cert_verify: bool,

    pub udp: bool,

    #[serde(rename = "rand-host")]
    pub rand_host: bool,

    #[serde(rename = "prefix-name")]
    pub prefix_name: String,

    #[serde(default)]
    pub header: HashMap<String, Vec<String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            vehicle_type: String::new(),
            path: String::new(),
            url: String::new(),
            url_proxy: false,
            interval: 0,
            filter: String::new(),
            health_check: HealthCheckConfig::default(),
            force_cert_verify: false,
            udp: false,
            rand_host: false,
            prefix_name: String::new(),
            header: default_header(),
        }
    }
}

fn default_header() -> HashMap<String, Vec<String>> {
    let mut h = HashMap::new();
    h.insert(
        "User-Agent".to_string(),
        vec![format!("proxy-provider/{}", crate::VERSION)],
    );
    h
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<()> {
        match self.vehicle_type.as_str() {
            "file" => {
                if self.path.is_empty() {
                    return Err(Error::config("file vehicle requires `path`"));
                }
            }
            "http" => {
                if self.url.is_empty() {
                    return Err(Error::config("http vehicle requires `url`"));
                }
            }
            other => return Err(Error::vehicle_type(other)),
        }
        if !self.filter.is_empty() {
            regex::Regex::new(&self.filter)?;
        }
        Ok(())
    }

    /// Interval clamped to non-negative, matching upstream's defensive clamp
    /// of a negative config value to zero.
    pub fn interval_secs(&self) -> u64 {
        self.interval.max(0) as u64
    }
}
