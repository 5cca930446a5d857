//! Byte sources backing a provider: a local file or an HTTP subscription.

use crate::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolves a named upstream proxy for HTTP vehicles configured with
/// `url-proxy: true`. The tunnel's own proxy registry implements this in
/// production; no implementation lives in this crate.
#[async_trait]
pub trait UpstreamProxyLocator: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<reqwest::Proxy>;
}

/// Bytes plus a content digest, returned by every vehicle read.
pub struct VehicleRead {
    pub bytes: Vec<u8>,
    pub digest: String,
    /// Present only for HTTP vehicles that returned a `Subscription-Userinfo` header.
    pub subscription_userinfo: Option<String>,
}

fn digest_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait Vehicle: Send + Sync {
    async fn read(&self) -> Result<VehicleRead>;

    /// Path used for display purposes (e.g. the control surface's provider
    /// listing doesn't need it, but error messages do).
    fn path(&self) -> &str;
}

pub struct FileVehicle {
    path: PathBuf,
}

impl FileVehicle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileVehicle { path: path.into() }
    }
}

#[async_trait]
impl Vehicle for FileVehicle {
    async fn read(&self) -> Result<VehicleRead> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::vehicle_fetch(format!("{}: {e}", self.path.display())))?;
        let digest = digest_of(&bytes);
        Ok(VehicleRead {
            bytes,
            digest,
            subscription_userinfo: None,
        })
    }

    fn path(&self) -> &str {
        self.path.to_str().unwrap_or("")
    }
}

pub struct HttpVehicle {
    url: String,
    via_proxy: bool,
    headers: HashMap<String, Vec<String>>,
    proxy_locator: Option<Arc<dyn UpstreamProxyLocator>>,
}

impl HttpVehicle {
    pub fn new(
        url: impl Into<String>,
        via_proxy: bool,
        headers: HashMap<String, Vec<String>>,
        proxy_locator: Option<Arc<dyn UpstreamProxyLocator>>,
    ) -> Self {
        HttpVehicle {
            url: url.into(),
            via_proxy,
            headers,
            proxy_locator,
        }
    }
}

const DEFAULT_USER_AGENT: &str = concat!("proxy-provider/", env!("CARGO_PKG_VERSION"));

#[async_trait]
impl Vehicle for HttpVehicle {
    async fn read(&self) -> Result<VehicleRead> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));

        if self.via_proxy {
            if let Some(locator) = &self.proxy_locator {
                if let Some(proxy) = locator.resolve(&self.url).await {
                    builder = builder.proxy(proxy);
                }
            }
        }

        let client = builder.build()?;
        let mut req = client.get(&self.url);

        let mut saw_user_agent = false;
        for (name, values) in &self.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                saw_user_agent = true;
            }
            for value in values {
                req = req.header(name, value);
            }
        }
        if !saw_user_agent {
            req = req.header("User-Agent", DEFAULT_USER_AGENT);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::vehicle_fetch(format!(
                "{} returned {}",
                self.url,
                resp.status()
            )));
        }

        let subscription_userinfo = resp
            .headers()
            .get("subscription-userinfo")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = resp.bytes().await?.to_vec();
        let digest = digest_of(&bytes);

        Ok(VehicleRead {
            bytes,
            digest,
            subscription_userinfo,
        })
    }

    fn path(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_vehicle_reads_and_digests() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("provider-vehicle-test-{}.yaml", std::process::id()));
        tokio::fs::write(&path, b"proxies: []\n").await.unwrap();

        let vehicle = FileVehicle::new(path.clone());
        let read1 = vehicle.read().await.unwrap();
        let read2 = vehicle.read().await.unwrap();
        assert_eq!(read1.digest, read2.digest);
        assert!(!read1.digest.is_empty());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_vehicle_missing_path_errors() {
        let vehicle = FileVehicle::new("/nonexistent/path/provider.yaml");
        assert!(vehicle.read().await.is_err());
    }
}
