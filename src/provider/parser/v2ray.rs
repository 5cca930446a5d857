//! V2Ray-style base64 subscription line format: one `scheme://...` URI per
//! line, covering trojan/vmess/ss/ssr/vless.

use super::Mapping;
use crate::{Error, Result};
use base64::{engine::general_purpose, Engine};
use rand::Rng;
use serde_yaml::Value;
use std::collections::HashMap;

fn decode_body(body: &str) -> Option<Vec<u8>> {
    general_purpose::STANDARD
        .decode(body)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(body))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(body))
        .ok()
}

fn decode_body_str(body: &str) -> Option<String> {
    decode_body(body).and_then(|b| String::from_utf8(b).ok())
}

/// SSR's query portion uses `+`/`/` substituted with `-`/`_` and no padding.
fn decode_url_safe(s: &str) -> Option<String> {
    let standard: String = s.chars().map(|c| match c {
        '-' => '+',
        '_' => '/',
        other => other,
    }).collect();
    decode_body_str(&standard)
}

fn random_hostname() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let s: String = (0..12)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("{s}.example.com")
}

fn v(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

/// Decodes the full subscription payload (already base64-or-plaintext
/// decoded into `lines`) into normalized mappings. Name uniqueness is
/// resolved only within this decoder.
pub fn parse(bytes: &[u8]) -> Result<Vec<Mapping>> {
    let text = decode_body_str(std::str::from_utf8(bytes).unwrap_or_default())
        .or_else(|| std::str::from_utf8(bytes).ok().map(String::from))
        .ok_or_else(|| Error::parse_failure("v2ray payload is not valid utf-8"))?;

    let mut mappings = Vec::new();
    let mut name_counts: HashMap<String, u32> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((scheme, rest)) = line.split_once("://") else {
            continue;
        };

        let parsed = match scheme {
            "trojan" => parse_trojan(rest),
            "vmess" => parse_vmess(rest),
            "ss" => parse_ss(rest),
            "ssr" => parse_ssr(rest),
            "vless" => parse_vless(rest),
            _ => None,
        };

        if let Some(mut mapping) = parsed {
            dedup_name(&mut mapping, &mut name_counts);
            mappings.push(mapping);
        }
    }

    if mappings.is_empty() {
        return Err(Error::parse_failure("no valid v2ray entries found"));
    }

    Ok(mappings)
}

fn dedup_name(mapping: &mut Mapping, counts: &mut HashMap<String, u32>) {
    let name = mapping
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unnamed")
        .to_string();
    let count = counts.entry(name.clone()).or_insert(0);
    if *count > 0 {
        mapping.insert("name".to_string(), v(format!("{name}-{:02}", *count)));
    }
    *count += 1;
}

fn parse_trojan(rest: &str) -> Option<Mapping> {
    let url = url::Url::parse(&format!("trojan://{rest}")).ok()?;
    let password = url.username().to_string();
    let server = url.host_str()?.to_string();
    let port = url.port()?;
    let name = urlencoding::decode(url.fragment().unwrap_or(&server)).ok()?.into_owned();

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let mut m: Mapping = HashMap::new();
    m.insert("name".into(), v(name));
    m.insert("type".into(), v("trojan"));
    m.insert("server".into(), v(server));
    m.insert("port".into(), v(port.to_string()));
    m.insert("password".into(), v(password));
    m.insert("udp".into(), Value::Bool(true));
    m.insert("skip-cert-verify".into(), Value::Bool(false));

    if let Some(sni) = query.get("sni") {
        m.insert("sni".into(), v(sni.clone()));
    }

    if let Some(network) = query.get("type") {
        let network = network.to_lowercase();
        m.insert("network".into(), v(network.clone()));
        if network == "ws" {
            let path = query.get("path").cloned().unwrap_or_else(|| "/".to_string());
            let mut headers = Mapping::new();
            headers.insert("User-Agent".into(), v(random_hostname()));
            let mut ws_opts = Mapping::new();
            ws_opts.insert("path".into(), v(path));
            ws_opts.insert("headers".into(), Value::Mapping(headers.into_iter().collect()));
            m.insert("ws-opts".into(), Value::Mapping(ws_opts.into_iter().collect()));
        }
    }

    Some(m)
}

fn parse_vmess(rest: &str) -> Option<Mapping> {
    let json_str = decode_body_str(rest)?;
    let body: serde_json::Value = serde_json::from_str(&json_str).ok()?;

    let name = body.get("ps")?.as_str()?.to_string();
    let server = body.get("add")?.as_str()?.to_string();
    let port = body.get("port").and_then(|p| p.as_str().map(str::to_string).or_else(|| p.as_u64().map(|n| n.to_string())))?;
    let uuid = body.get("id")?.as_str()?.to_string();
    let alter_id = body.get("aid").and_then(|a| a.as_u64().or_else(|| a.as_str().and_then(|s| s.parse().ok()))).unwrap_or(0);

    let network = body.get("net").and_then(|n| n.as_str()).unwrap_or("tcp").to_string();

    // `tls` may arrive as either a string ("tls"/"") or a JSON boolean.
    let tls = match body.get("tls") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => !s.is_empty() && s != "0" && s != "null",
        _ => false,
    };

    let mut m: Mapping = HashMap::new();
    m.insert("name".into(), v(name));
    m.insert("type".into(), v("vmess"));
    m.insert("server".into(), v(server.clone()));
    m.insert("port".into(), v(port));
    m.insert("uuid".into(), v(uuid));
    m.insert("alterId".into(), Value::Number(alter_id.into()));
    m.insert("cipher".into(), v("auto"));
    m.insert("network".into(), v(network.clone()));
    m.insert("tls".into(), Value::Bool(tls));
    m.insert("udp".into(), Value::Bool(true));
    m.insert("skip-cert-verify".into(), Value::Bool(false));

    if tls {
        if let Some(sni) = body.get("sni").and_then(|s| s.as_str()) {
            m.insert("servername".into(), v(sni.to_string()));
        }
    }

    let host = body.get("host").and_then(|h| h.as_str()).filter(|h| !h.is_empty());
    let path = body.get("path").and_then(|p| p.as_str()).filter(|p| !p.is_empty());

    if network == "ws" {
        let ws_host = if !tls {
            host.map(str::to_string).unwrap_or_else(random_hostname)
        } else {
            host.map(str::to_string).unwrap_or_else(|| server.clone())
        };
        let mut headers = Mapping::new();
        headers.insert("Host".into(), v(ws_host));
        let mut ws_opts = Mapping::new();
        ws_opts.insert("path".into(), v(path.unwrap_or("/").to_string()));
        ws_opts.insert("headers".into(), Value::Mapping(headers.into_iter().collect()));
        m.insert("ws-opts".into(), Value::Mapping(ws_opts.into_iter().collect()));
    } else if network == "http" {
        let mut headers = Mapping::new();
        headers.insert(
            "Host".into(),
            Value::Sequence(vec![v(host.map(str::to_string).unwrap_or(server))]),
        );
        let mut http_opts = Mapping::new();
        http_opts.insert("headers".into(), Value::Mapping(headers.into_iter().collect()));
        m.insert("http-opts".into(), Value::Mapping(http_opts.into_iter().collect()));
    }

    Some(m)
}

fn parse_ss(rest: &str) -> Option<Mapping> {
    let full = format!("ss://{rest}");
    let url = url::Url::parse(&full).ok()?;

    let (server, port, userinfo) = if url.port().is_some() {
        (url.host_str()?.to_string(), url.port()?, url.username().to_string())
    } else {
        // No explicit port: host portion is itself base64(cipher:password@host:port).
        let decoded = decode_body_str(url.host_str()?)?;
        let inner = url::Url::parse(&format!("ss://{decoded}")).ok()?;
        (inner.host_str()?.to_string(), inner.port()?, inner.username().to_string())
    };

    let (cipher, password) = if let Some(pw) = url.password() {
        (userinfo, pw.to_string())
    } else {
        let decoded = decode_body_str(&userinfo)?;
        let (c, p) = decoded.split_once(':')?;
        (c.to_string(), p.to_string())
    };

    let name = url.fragment()
        .and_then(|f| urlencoding::decode(f).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| server.clone());

    let mut m: Mapping = HashMap::new();
    m.insert("name".into(), v(name));
    m.insert("type".into(), v("ss"));
    m.insert("server".into(), v(server));
    m.insert("port".into(), v(port.to_string()));
    m.insert("cipher".into(), v(cipher));
    m.insert("password".into(), v(password));
    m.insert("udp".into(), Value::Bool(true));

    Some(m)
}

fn parse_ssr(rest: &str) -> Option<Mapping> {
    let decoded = decode_body_str(rest)?;
    let (head, query) = decoded.split_once("/?").unwrap_or((decoded.as_str(), ""));

    let parts: Vec<&str> = head.splitn(6, ':').collect();
    if parts.len() != 6 {
        return None;
    }
    let [server, port, protocol, method, obfs, password_b64]: [&str; 6] = parts.try_into().ok()?;
    let password = decode_body_str(password_b64)?;

    let mut query_params: HashMap<String, String> = HashMap::new();
    for pair in query.split('&') {
        if let Some((k, val)) = pair.split_once('=') {
            query_params.insert(k.to_string(), val.to_string());
        }
    }

    let name = query_params
        .get("remarks")
        .and_then(|r| decode_url_safe(r))
        .unwrap_or_else(|| server.to_string());
    let obfs_param = query_params.get("obfsparam").and_then(|p| decode_url_safe(p)).unwrap_or_default();
    // protoparam is taken verbatim (not base64-decoded) to match the original wire format.
    let proto_param = query_params.get("protoparam").cloned().unwrap_or_default();

    let mut m: Mapping = HashMap::new();
    m.insert("name".into(), v(name));
    m.insert("type".into(), v("ssr"));
    m.insert("server".into(), v(server.to_string()));
    m.insert("port".into(), v(port.to_string()));
    m.insert("protocol".into(), v(protocol.to_string()));
    m.insert("cipher".into(), v(method.to_string()));
    m.insert("obfs".into(), v(obfs.to_string()));
    m.insert("password".into(), v(password));
    m.insert("obfs-param".into(), v(obfs_param));
    m.insert("protocol-param".into(), v(proto_param));
    m.insert("udp".into(), Value::Bool(true));

    Some(m)
}

fn parse_vless(rest: &str) -> Option<Mapping> {
    let url = url::Url::parse(&format!("vless://{rest}")).ok()?;
    let uuid = url.username().to_string();
    let server = url.host_str()?.to_string();
    let port = url.port()?;
    let name = url.fragment()
        .and_then(|f| urlencoding::decode(f).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| server.clone());

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let mut m: Mapping = HashMap::new();
    m.insert("name".into(), v(name));
    m.insert("type".into(), v("vless"));
    m.insert("server".into(), v(server));
    m.insert("port".into(), v(port.to_string()));
    m.insert("uuid".into(), v(uuid));
    m.insert("udp".into(), Value::Bool(true));
    m.insert("skip-cert-verify".into(), Value::Bool(false));

    if let Some(sni) = query.get("sni") {
        m.insert("servername".into(), v(sni.clone()));
    }
    if let Some(flow) = query.get("flow") {
        m.insert("flow".into(), v(flow.to_lowercase()));
    }
    if let Some(network) = query.get("type") {
        let network = network.to_lowercase();
        m.insert("network".into(), v(network.clone()));
        if network == "ws" {
            let path = query.get("path").cloned().unwrap_or_else(|| "/".to_string());
            let mut ws_opts = Mapping::new();
            ws_opts.insert("path".into(), v(path));
            m.insert("ws-opts".into(), Value::Mapping(ws_opts.into_iter().collect()));
        }
    }

    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trojan_ws() {
        let line = "trojan://pw@example.com:443?sni=a.example&type=ws&path=/x#My%20Node";
        let mappings = parse(line.as_bytes()).unwrap();
        assert_eq!(mappings.len(), 1);
        let m = &mappings[0];
        assert_eq!(m["name"].as_str().unwrap(), "My Node");
        assert_eq!(m["type"].as_str().unwrap(), "trojan");
        assert_eq!(m["server"].as_str().unwrap(), "example.com");
        assert_eq!(m["port"].as_str().unwrap(), "443");
        assert_eq!(m["password"].as_str().unwrap(), "pw");
        assert_eq!(m["network"].as_str().unwrap(), "ws");
        assert!(m.contains_key("ws-opts"));
    }

    #[test]
    fn test_duplicate_names_suffixed() {
        let vmess_json = r#"{"ps":"A","add":"1.2.3.4","port":"443","id":"11111111-1111-1111-1111-111111111111","aid":"0","net":"tcp"}"#;
        let encoded = general_purpose::STANDARD.encode(vmess_json);
        let line = format!("vmess://{encoded}\nvmess://{encoded}\nvmess://{encoded}");
        let mappings = parse(line.as_bytes()).unwrap();
        let names: Vec<&str> = mappings.iter().map(|m| m["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["A", "A-01", "A-02"]);
    }

    #[test]
    fn test_vmess_tls_as_boolean_or_string() {
        let j1 = r#"{"ps":"n1","add":"s.example","port":443,"id":"11111111-1111-1111-1111-111111111111","aid":0,"tls":true}"#;
        let j2 = r#"{"ps":"n2","add":"s.example","port":443,"id":"11111111-1111-1111-1111-111111111111","aid":0,"tls":"tls"}"#;
        for j in [j1, j2] {
            let encoded = general_purpose::STANDARD.encode(j);
            let mappings = parse(format!("vmess://{encoded}").as_bytes()).unwrap();
            assert_eq!(mappings[0]["tls"], Value::Bool(true));
        }
    }
}
