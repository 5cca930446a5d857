//! WireGuard INI-style subscription format: `[interface]`-delimited peer blocks.

use super::Mapping;
use crate::{Error, Result};
use serde_yaml::Value;
use std::collections::HashMap;
use std::net::IpAddr;

fn v(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

pub fn parse(bytes: &[u8]) -> Result<Vec<Mapping>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::parse_failure("wireguard payload is not valid utf-8"))?;

    let mut peers = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.eq_ignore_ascii_case("[interface]") {
            if let Some(prev) = current.take() {
                peers.push(prev);
            }
            current = Some(HashMap::new());
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if let Some((key, value)) = line.split_once('=') {
            block.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    if let Some(prev) = current.take() {
        peers.push(prev);
    }

    let mut mappings = Vec::new();
    for block in peers {
        if let Some(mapping) = block_to_mapping(&block) {
            mappings.push(mapping);
        }
    }

    if mappings.is_empty() {
        return Err(Error::parse_failure("no valid wireguard peers found"));
    }

    Ok(mappings)
}

fn block_to_mapping(block: &HashMap<String, String>) -> Option<Mapping> {
    let mut m: Mapping = HashMap::new();
    m.insert("type".into(), v("wireguard"));
    m.insert("udp".into(), Value::Bool(true));
    m.insert("dns".into(), Value::Sequence(vec![]));

    if let Some(endpoint) = block.get("endpoint") {
        let (host, port) = endpoint.rsplit_once(':')?;
        m.insert("server".into(), v(host.to_string()));
        m.insert("port".into(), Value::Number(port.parse::<u64>().ok()?.into()));
    }

    if let Some(address) = block.get("address") {
        for part in address.split(',') {
            let part = part.trim();
            let addr_str = part.split('/').next().unwrap_or(part);
            if let Ok(ip) = addr_str.parse::<IpAddr>() {
                match ip {
                    IpAddr::V4(_) if !m.contains_key("ip") => {
                        m.insert("ip".into(), v(addr_str.to_string()));
                    }
                    IpAddr::V6(_) if !m.contains_key("ipv6") => {
                        m.insert("ipv6".into(), v(addr_str.to_string()));
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(pk) = block.get("privatekey") {
        m.insert("private-key".into(), v(pk.clone()));
    }
    let public_key = block.get("publickey").cloned();
    if let Some(pk) = &public_key {
        m.insert("public-key".into(), v(pk.clone()));
    }
    if let Some(psk) = block.get("presharedkey") {
        m.insert("preshared-key".into(), v(psk.clone()));
    }
    if let Some(dns) = block.get("dns") {
        let list: Vec<Value> = dns.split(',').map(|s| v(s.trim().to_string())).collect();
        m.insert("dns".into(), Value::Sequence(list));
    }
    if let Some(mtu) = block.get("mtu") {
        if let Ok(n) = mtu.parse::<u64>() {
            m.insert("mtu".into(), Value::Number(n.into()));
        }
    }

    let name = block.get("name").cloned().or_else(|| {
        public_key
            .as_ref()
            .filter(|pk| pk.len() >= 8)
            .map(|pk| format!("wg-{}", &pk[..8]))
    })?;
    m.insert("name".into(), v(name));

    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_peer_with_name() {
        let ini = "[interface]\nname = my-peer\nendpoint = 10.0.0.1:51820\naddress = 10.8.0.2/32, fd00::2/128\nprivatekey = aaa\npublickey = bbbbbbbbbbbb\nmtu = 1420\n";
        let mappings = parse(ini.as_bytes()).unwrap();
        assert_eq!(mappings.len(), 1);
        let m = &mappings[0];
        assert_eq!(m["name"].as_str().unwrap(), "my-peer");
        assert_eq!(m["server"].as_str().unwrap(), "10.0.0.1");
        assert_eq!(m["port"].as_u64().unwrap(), 51820);
        assert_eq!(m["ip"].as_str().unwrap(), "10.8.0.2");
    }

    #[test]
    fn test_synthesized_name_from_pubkey() {
        let ini = "[interface]\nendpoint = 10.0.0.1:51820\npublickey = abcdefgh12345\n";
        let mappings = parse(ini.as_bytes()).unwrap();
        assert_eq!(mappings[0]["name"].as_str().unwrap(), "wg-abcdefgh");
    }
}
