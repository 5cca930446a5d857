//! Outbound proxy contract
//!
//! The provider subsystem only needs a narrow slice of what a real proxy
//! dialer exposes: a stable name, a latency probe, and a cleanup hook. The
//! actual protocol transports (Shadowsocks, VMess, Trojan, ...) are external
//! collaborators built from the normalized mappings produced by the parsers
//! in [`crate::provider::parser`]; this module only models the seam.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tag carried alongside a normalized proxy mapping so callers can tell
/// protocols apart without inspecting the mapping itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Direct,
    Reject,
    Shadowsocks,
    ShadowsocksR,
    Vmess,
    Trojan,
    Vless,
    WireGuard,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Direct => write!(f, "direct"),
            ProxyType::Reject => write!(f, "reject"),
            ProxyType::Shadowsocks => write!(f, "ss"),
            ProxyType::ShadowsocksR => write!(f, "ssr"),
            ProxyType::Vmess => write!(f, "vmess"),
            ProxyType::Trojan => write!(f, "trojan"),
            ProxyType::Vless => write!(f, "vless"),
            ProxyType::WireGuard => write!(f, "wireguard"),
        }
    }
}

impl TryFrom<&str> for ProxyType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(ProxyType::Direct),
            "reject" => Ok(ProxyType::Reject),
            "ss" | "shadowsocks" => Ok(ProxyType::Shadowsocks),
            "ssr" | "shadowsocksr" => Ok(ProxyType::ShadowsocksR),
            "vmess" => Ok(ProxyType::Vmess),
            "trojan" => Ok(ProxyType::Trojan),
            "vless" => Ok(ProxyType::Vless),
            "wireguard" => Ok(ProxyType::WireGuard),
            other => Err(Error::vehicle_type(format!("unknown proxy type: {other}"))),
        }
    }
}

/// Minimal contract a concrete proxy dialer must satisfy for the provider
/// subsystem to hold, probe and retire it.
#[async_trait]
pub trait OutboundProxy: Send + Sync {
    /// Stable display name, unique within the provider that owns it.
    fn name(&self) -> &str;

    fn proxy_type(&self) -> ProxyType;

    /// Probe latency against `url`, returning the round trip in milliseconds.
    async fn url_test(&self, url: &str, timeout: Duration) -> Result<u64>;

    /// Invoked exactly once when this endpoint is retired from a provider.
    async fn cleanup(&self) {}
}

/// Turns a normalized mapping produced by a parser into a concrete proxy.
///
/// The real transports live outside this crate; callers supply their own
/// factory. [`DescriptorProxy`] below is the default implementation used
/// when no richer factory is configured, and simply keeps the mapping
/// around without dialing anything.
pub trait ProxyFactory: Send + Sync {
    fn build(&self, mapping: &HashMap<String, serde_yaml::Value>) -> Result<std::sync::Arc<dyn OutboundProxy>>;
}

/// Default factory: wraps each mapping in a [`DescriptorProxy`] that never
/// dials out. Useful for tests and for hosts that only care about listing
/// and health-check bookkeeping rather than actual connectivity.
pub struct DescriptorFactory;

impl ProxyFactory for DescriptorFactory {
    fn build(&self, mapping: &HashMap<String, serde_yaml::Value>) -> Result<std::sync::Arc<dyn OutboundProxy>> {
        let name = mapping
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::schema_missing("name"))?
            .to_string();
        let proxy_type = mapping
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::schema_missing("type"))?;
        let proxy_type = ProxyType::try_from(proxy_type)?;
        Ok(std::sync::Arc::new(DescriptorProxy::new(name, proxy_type)))
    }
}

/// A proxy endpoint that only remembers its descriptor; `url_test` reports a
/// synthetic, constant-ish latency so providers can be exercised end-to-end
/// without a live network.
pub struct DescriptorProxy {
    name: String,
    proxy_type: ProxyType,
    probes: AtomicU64,
}

impl DescriptorProxy {
    pub fn new(name: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            name: name.into(),
            proxy_type,
            probes: AtomicU64::new(0),
        }
    }

    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundProxy for DescriptorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        self.proxy_type
    }

    async fn url_test(&self, _url: &str, _timeout: Duration) -> Result<u64> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(0)
    }
}

/// Deterministic test double: reports a caller-configured fixed latency or
/// failure, and records whether it was cleaned up.
#[cfg(test)]
pub struct MockProxy {
    name: String,
    latency_ms: Option<u64>,
    pub cleaned_up: std::sync::atomic::AtomicBool,
    created_at: Instant,
}

#[cfg(test)]
impl MockProxy {
    pub fn new(name: impl Into<String>, latency_ms: Option<u64>) -> Self {
        Self {
            name: name.into(),
            latency_ms,
            cleaned_up: std::sync::atomic::AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
#[async_trait]
impl OutboundProxy for MockProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        ProxyType::Direct
    }

    async fn url_test(&self, _url: &str, _timeout: Duration) -> Result<u64> {
        match self.latency_ms {
            Some(ms) => Ok(ms),
            None => Err(Error::internal("probe failed")),
        }
    }

    async fn cleanup(&self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_type_parsing() {
        assert_eq!(ProxyType::try_from("ss").unwrap(), ProxyType::Shadowsocks);
        assert_eq!(ProxyType::try_from("vmess").unwrap(), ProxyType::Vmess);
        assert_eq!(ProxyType::try_from("ssr").unwrap(), ProxyType::ShadowsocksR);
        assert!(ProxyType::try_from("unknown").is_err());
    }

    #[tokio::test]
    async fn test_mock_proxy_cleanup() {
        let p = MockProxy::new("node-a", Some(42));
        assert_eq!(p.url_test("http://example.com", Duration::from_secs(1)).await.unwrap(), 42);
        assert!(!p.cleaned_up.load(Ordering::SeqCst));
        p.cleanup().await;
        assert!(p.cleaned_up.load(Ordering::SeqCst));
    }
}
