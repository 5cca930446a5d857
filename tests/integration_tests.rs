//! End-to-end tests tying vehicles, fetchers, parsers and provider
//! variants together, covering the literal scenarios the subsystem is
//! expected to satisfy.

use async_trait::async_trait;
use base64::Engine;
use proxy_provider::outbound::{OutboundProxy, ProxyFactory, ProxyType};
use proxy_provider::provider::filter::FilterProvider;
use proxy_provider::provider::parser::parse_and_normalize;
use proxy_provider::provider::vehicle::{Vehicle, VehicleRead};
use proxy_provider::provider::{Provider, ProxySetProvider, VehicleType};
use proxy_provider::statistic::StatisticManager;
use proxy_provider::Error;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A proxy that just remembers its name and whether `cleanup` ran.
struct TrackedProxy {
    name: String,
    cleaned_up: Arc<AtomicBool>,
}

#[async_trait]
impl OutboundProxy for TrackedProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_type(&self) -> ProxyType {
        ProxyType::Shadowsocks
    }

    async fn url_test(&self, _url: &str, _timeout: Duration) -> proxy_provider::Result<u64> {
        Ok(1)
    }

    async fn cleanup(&self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

/// Builds `TrackedProxy`s and exposes each one's cleanup flag by name.
#[derive(Default)]
struct TrackingFactory {
    cleaned: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl TrackingFactory {
    fn cleaned_up(&self, name: &str) -> bool {
        self.cleaned
            .lock()
            .unwrap()
            .get(name)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl ProxyFactory for TrackingFactory {
    fn build(&self, mapping: &HashMap<String, serde_yaml::Value>) -> proxy_provider::Result<Arc<dyn OutboundProxy>> {
        let name = mapping
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::schema_missing("name"))?
            .to_string();
        let flag = Arc::new(AtomicBool::new(false));
        self.cleaned.lock().unwrap().insert(name.clone(), flag.clone());
        Ok(Arc::new(TrackedProxy { name, cleaned_up: flag }))
    }
}

struct SequencedVehicle {
    payloads: Vec<String>,
    reads: AtomicU32,
}

#[async_trait]
impl Vehicle for SequencedVehicle {
    async fn read(&self) -> proxy_provider::Result<VehicleRead> {
        let i = self.reads.fetch_add(1, Ordering::SeqCst) as usize;
        let bytes = self.payloads[i.min(self.payloads.len() - 1)].as_bytes().to_vec();
        Ok(VehicleRead {
            bytes,
            digest: i.to_string(),
            subscription_userinfo: None,
        })
    }

    fn path(&self) -> &str {
        "mock"
    }
}

fn yaml(entries: &[(&str, &str)]) -> String {
    let mut s = String::from("proxies:\n");
    for (name, server) in entries {
        s.push_str(&format!(
            "  - name: {name}\n    type: ss\n    server: {server}\n    port: 443\n    cipher: aes-256-gcm\n    password: pw\n"
        ));
    }
    s
}

#[test]
fn test_v2ray_trojan_ws_end_to_end() {
    let line = "trojan://pw@example.com:443?sni=a.example&type=ws&path=/x#My%20Node";
    let mappings = parse_and_normalize(line.as_bytes(), None, "").unwrap();
    assert_eq!(mappings.len(), 1);
    let m = &mappings[0];
    assert_eq!(m["name"].as_str().unwrap(), "My Node");
    assert_eq!(m["type"].as_str().unwrap(), "trojan");
    assert_eq!(m["server"].as_str().unwrap(), "example.com");
    assert_eq!(m["port"].as_str().unwrap(), "443");
    assert_eq!(m["password"].as_str().unwrap(), "pw");
    assert!(m["udp"].as_bool().unwrap());
    assert!(!m["skip-cert-verify"].as_bool().unwrap());
    assert_eq!(m["sni"].as_str().unwrap(), "a.example");
    assert_eq!(m["network"].as_str().unwrap(), "ws");
    let ws_opts = m["ws-opts"].as_mapping().unwrap();
    let headers = ws_opts
        .get(&serde_yaml::Value::String("headers".to_string()))
        .unwrap()
        .as_mapping()
        .unwrap();
    assert!(!headers
        .get(&serde_yaml::Value::String("User-Agent".to_string()))
        .unwrap()
        .as_str()
        .unwrap()
        .is_empty());
}

#[test]
fn test_duplicate_names_suffixed_end_to_end() {
    let vmess_json = r#"{"ps":"A","add":"example.com","port":"443","id":"11111111-1111-1111-1111-111111111111","aid":"0","net":"tcp"}"#;
    let encoded = base64::engine::general_purpose::STANDARD.encode(vmess_json);
    let line = format!("vmess://{encoded}\nvmess://{encoded}\nvmess://{encoded}");
    let mappings = parse_and_normalize(line.as_bytes(), None, "").unwrap();
    let names: Vec<&str> = mappings.iter().map(|m| m["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["A", "A-01", "A-02"]);
}

#[test]
fn test_invalid_server_omitted_from_vmess() {
    let vmess_json = r#"{"ps":"bad","add":"8.8.8.8","port":"443","id":"11111111-1111-1111-1111-111111111111","aid":"0","net":"tcp"}"#;
    let encoded = base64::engine::general_purpose::STANDARD.encode(vmess_json);
    let line = format!("vmess://{encoded}");
    let err = parse_and_normalize(line.as_bytes(), None, "").unwrap_err();
    assert!(matches!(err, Error::ParseFailure(_)));
}

#[test]
fn test_yaml_missing_proxies_is_schema_missing() {
    let err = parse_and_normalize(b"rules: []\n", None, "").unwrap_err();
    assert!(matches!(err, Error::SchemaMissing(_)));
}

#[tokio::test]
async fn test_fetcher_dedup_via_provider_update() {
    let statistic = Arc::new(StatisticManager::new());
    let payload = yaml(&[("a", "10.0.0.1")]);
    let vehicle: Arc<dyn Vehicle> = Arc::new(SequencedVehicle {
        payloads: vec![payload.clone(), payload.clone(), payload],
        reads: AtomicU32::new(0),
    });
    let provider = ProxySetProvider::new(
        "dedup-test",
        VehicleType::File,
        vehicle,
        Duration::from_secs(0),
        None,
        "",
        Arc::new(TrackingFactory::default()),
        "",
        Duration::from_secs(0),
        true,
        statistic,
    );

    provider.initial().await.unwrap();
    assert_eq!(provider.count().await, 1);

    // Same content every read: the fetcher's digest compare should short
    // circuit before re-parsing, leaving the set unchanged.
    provider.update().await.unwrap();
    assert_eq!(provider.count().await, 1);
    assert_eq!(provider.proxies().await[0].name(), "a");
}

#[tokio::test]
async fn test_filter_propagation_and_cleanup() {
    let statistic = Arc::new(StatisticManager::new());
    let payload_1 = yaml(&[("A", "10.0.0.1"), ("B", "10.0.0.2"), ("AA", "10.0.0.3")]);
    let payload_2 = yaml(&[("B", "10.0.0.2"), ("BB", "10.0.0.4")]);
    let vehicle: Arc<dyn Vehicle> = Arc::new(SequencedVehicle {
        payloads: vec![payload_1, payload_2],
        reads: AtomicU32::new(0),
    });
    let factory = Arc::new(TrackingFactory::default());

    let parent = ProxySetProvider::new(
        "parent",
        VehicleType::File,
        vehicle,
        Duration::from_secs(0),
        None,
        "",
        factory.clone(),
        "",
        Duration::from_secs(0),
        true,
        statistic,
    );
    parent.initial().await.unwrap();

    let filter = FilterProvider::new(
        "a-only",
        parent.clone(),
        Some(Regex::new("^A").unwrap()),
        "",
        Duration::from_secs(0),
        true,
    );
    filter.initial().await.unwrap();

    let mut names: Vec<String> = filter.proxies().await.iter().map(|p| p.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["A".to_string(), "AA".to_string()]);

    parent.register_dependent(Arc::downgrade(&filter));
    parent.update().await.unwrap();

    // Dependent notification is spawned fire-and-forget; give it a tick to run.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(filter.count().await, 0);
    assert!(factory.cleaned_up("A"));
    assert!(factory.cleaned_up("AA"));
    assert!(!factory.cleaned_up("B"));
}
