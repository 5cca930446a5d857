//! The structured `{proxies: [...]}` schema.

use super::Mapping;
use serde::Deserialize;

#[derive(Deserialize)]
struct ProxiesSchema {
    #[serde(default)]
    proxies: Vec<Mapping>,
}

pub enum YamlOutcome {
    /// Bytes are not valid YAML, or do not deserialize to the schema at all.
    NotYaml,
    /// Deserialized successfully but carried zero entries.
    Empty,
    Proxies(Vec<Mapping>),
}

/// Attempts the YAML proxies schema. Never falls back itself; the caller
/// decides whether a `NotYaml` result should try the V2Ray/WireGuard decoders.
pub fn try_parse(bytes: &[u8]) -> YamlOutcome {
    match serde_yaml::from_slice::<ProxiesSchema>(bytes) {
        Ok(schema) if schema.proxies.is_empty() => YamlOutcome::Empty,
        Ok(schema) => YamlOutcome::Proxies(schema.proxies),
        Err(_) => YamlOutcome::NotYaml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_proxies_list() {
        let yaml = b"proxies:\n  - name: a\n    type: ss\n    server: 1.2.3.4\n    port: 443\n";
        match try_parse(yaml) {
            YamlOutcome::Proxies(v) => assert_eq!(v.len(), 1),
            _ => panic!("expected Proxies"),
        }
    }

    #[test]
    fn test_empty_proxies_list() {
        let yaml = b"rules: []\n";
        assert!(matches!(try_parse(yaml), YamlOutcome::Empty));
    }

    #[test]
    fn test_not_yaml() {
        let bytes = b"trojan://pw@example.com:443#name\nvmess://whatever";
        // This single line is actually not valid YAML mapping syntax in a way
        // that fails to produce the schema (colon-delimited scheme URIs parse
        // as a YAML scalar document, not a mapping), so it reports NotYaml.
        assert!(matches!(try_parse(bytes), YamlOutcome::NotYaml));
    }
}
