//! Bytes-to-mapping normalization: YAML schema first, then the V2Ray line
//! format, then the WireGuard INI format.

mod v2ray;
mod wireguard;
mod yaml;

use crate::{Error, Result};
use regex::Regex;
use std::collections::HashMap;

/// A loosely-typed proxy descriptor, ready for an external `ProxyFactory`.
pub type Mapping = HashMap<String, serde_yaml::Value>;

/// Addresses that show up in broken or placeholder subscription entries;
/// never forwarded to a `ProxyFactory`.
const INVALID_SERVERS: &[&str] = &[
    "8.8.4.4",
    "8.8.8.8",
    "9.9.9.9",
    "1.0.0.1",
    "1.1.1.1",
    "1.2.3.4",
    "1.3.5.7",
    "127.0.0.1",
];

fn is_invalid_server(mapping: &Mapping) -> bool {
    mapping
        .get("server")
        .and_then(|v| v.as_str())
        .map(|s| INVALID_SERVERS.contains(&s))
        .unwrap_or(false)
}

fn apply_prefix(mapping: &mut Mapping, prefix: &str) {
    if prefix.is_empty() {
        return;
    }
    let name = mapping
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    mapping.insert(
        "name".to_string(),
        serde_yaml::Value::String(format!("{prefix}{name}")),
    );
}

fn matches_filter(mapping: &Mapping, filter: &Regex) -> bool {
    mapping
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| filter.is_match(s))
        .unwrap_or(false)
}

/// Parses raw subscription bytes into normalized mappings, applying the
/// invalid-server drop, optional regex filter and optional name prefix
/// uniformly regardless of which decoder produced the entries.
pub fn parse_and_normalize(
    bytes: &[u8],
    filter: Option<&Regex>,
    prefix_name: &str,
) -> Result<Vec<Mapping>> {
    let mut mappings = match yaml::try_parse(bytes) {
        yaml::YamlOutcome::Proxies(list) => list,
        yaml::YamlOutcome::Empty => {
            return Err(Error::schema_missing("proxies"));
        }
        yaml::YamlOutcome::NotYaml => v2ray::parse(bytes).or_else(|_| wireguard::parse(bytes))?,
    };

    mappings.retain(|m| !is_invalid_server(m));

    if let Some(filter) = filter {
        mappings.retain(|m| matches_filter(m, filter));
    }

    for mapping in &mut mappings {
        apply_prefix(mapping, prefix_name);
    }

    if mappings.is_empty() {
        return Err(Error::parse_failure("zero valid proxies after filtering"));
    }

    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_missing_proxies_fails_without_fallback() {
        let err = parse_and_normalize(b"rules: []\n", None, "").unwrap_err();
        assert!(matches!(err, Error::SchemaMissing(_)));
    }

    #[test]
    fn test_invalid_server_dropped() {
        let yaml = b"proxies:\n  - name: bad\n    type: ss\n    server: 8.8.8.8\n    port: 443\n  - name: good\n    type: ss\n    server: 1.2.3.5\n    port: 443\n";
        let mappings = parse_and_normalize(yaml, None, "").unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0]["name"].as_str().unwrap(), "good");
    }

    #[test]
    fn test_prefix_name_applied() {
        let yaml = b"proxies:\n  - name: node\n    type: ss\n    server: 1.2.3.5\n    port: 443\n";
        let mappings = parse_and_normalize(yaml, None, "HK-").unwrap();
        assert_eq!(mappings[0]["name"].as_str().unwrap(), "HK-node");
    }

    #[test]
    fn test_regex_filter_applied() {
        let yaml = b"proxies:\n  - name: HK-1\n    type: ss\n    server: 1.2.3.5\n    port: 443\n  - name: US-1\n    type: ss\n    server: 1.2.3.6\n    port: 443\n";
        let filter = Regex::new("^HK").unwrap();
        let mappings = parse_and_normalize(yaml, Some(&filter), "").unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0]["name"].as_str().unwrap(), "HK-1");
    }

    #[test]
    fn test_v2ray_fallback_on_yaml_syntax_error() {
        let line = b"trojan://pw@example.com:443#Node";
        let mappings = parse_and_normalize(line, None, "").unwrap();
        assert_eq!(mappings.len(), 1);
    }
}
