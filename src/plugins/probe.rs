//! HTTP responsiveness probing and web-port classification.

use crate::config::types::ProbeConfig;
use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::models::{Scheme, WebEndpoint};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::process::{Command, Stdio};

/// Ports treated as web even when the probe gets no answer.
const FORCED_WEB_PORTS: &[(u16, Scheme)] = &[(80, Scheme::Http), (443, Scheme::Https)];

const TLS_FIRST_PORTS: &[u16] = &[443, 8443, 9443];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Blocking HEAD-style probe; `None` means nothing answered.
pub trait WebProber: Send + Sync {
    fn probe(&self, endpoint: &WebEndpoint) -> Option<ProbeResponse>;
}

pub struct CurlProber {
    timeout_s: u64,
    user_agent: String,
}

impl CurlProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout_s: config.timeout_s,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl WebProber for CurlProber {
    fn probe(&self, endpoint: &WebEndpoint) -> Option<ProbeResponse> {
        let timeout = self.timeout_s.to_string();
        let output = Command::new("curl")
            .args(["-s", "-I", "-k", "--max-time", &timeout, "--connect-timeout", &timeout])
            .args(["-A", &self.user_agent])
            .arg(endpoint.url())
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(out) => parse_head_response(&String::from_utf8_lossy(&out.stdout)),
            Err(e) => {
                tracing::debug!("curl probe of {} failed: {}", endpoint.url(), e);
                None
            }
        }
    }
}

/// Parses the last response block of `curl -I` output.
pub fn parse_head_response(text: &str) -> Option<ProbeResponse> {
    let mut response: Option<ProbeResponse> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("HTTP/") {
            let status = line.split_whitespace().nth(1)?.parse().ok()?;
            response = Some(ProbeResponse {
                status,
                headers: Vec::new(),
            });
        } else if let (Some(resp), Some((name, value))) = (response.as_mut(), line.split_once(':')) {
            resp.headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    response
}

pub fn is_hostname(name: &str) -> bool {
    let name = name.trim_end_matches('.');
    name.contains('.')
        && name.parse::<IpAddr>().is_err()
        && name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Host part of an absolute URL, when it names a domain.
pub fn url_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r)?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    is_hostname(host).then(|| host.to_ascii_lowercase())
}

/// Facts carried by a probe answer: the endpoint itself plus header hints.
pub fn facts_from_response(endpoint: &WebEndpoint, response: &ProbeResponse) -> ContextUpdate {
    let mut update = ContextUpdate::default().endpoint(endpoint.clone());
    for (header, confidence) in [
        ("Server", 0.8),
        ("X-Powered-By", 0.8),
        ("X-Generator", 0.9),
        ("X-AspNet-Version", 0.9),
    ] {
        if let Some(value) = response.header(header) {
            if header == "X-AspNet-Version" {
                update.add_technology("asp.net", confidence);
            } else {
                for product in value.split([',', ' ']).filter(|p| !p.is_empty()) {
                    if !product.starts_with('(') {
                        update.add_technology(product, confidence);
                    }
                }
            }
        }
    }
    if let Some(host) = response.header("Location").and_then(url_host) {
        update.add_hostname(&host);
    }
    update
}

fn scheme_order(port: u16) -> [Scheme; 2] {
    if TLS_FIRST_PORTS.contains(&port) {
        [Scheme::Https, Scheme::Http]
    } else {
        [Scheme::Http, Scheme::Https]
    }
}

/// Probes each port on `host`; the first scheme that answers wins.
pub fn probe_ports(host: &str, ports: &[u16], prober: &dyn WebProber) -> ContextUpdate {
    let mut update = ContextUpdate::default();
    for &port in ports {
        for scheme in scheme_order(port) {
            let endpoint = WebEndpoint::new(host, port, scheme);
            if let Some(response) = prober.probe(&endpoint) {
                tracing::debug!("{} answered {}", endpoint.url(), response.status);
                update.absorb(facts_from_response(&endpoint, &response));
                break;
            }
        }
    }
    update
}

/// Open TCP ports that could serve HTTP but have no endpoint yet.
pub fn candidate_web_ports(ctx: &TargetContext, config: &ProbeConfig) -> Vec<u16> {
    let known: BTreeSet<u16> = ctx.web_endpoints.iter().map(|e| e.port).collect();
    ctx.tcp_ports()
        .filter(|port| !known.contains(port))
        .filter(|port| {
            config.ports.contains(port) || FORCED_WEB_PORTS.iter().any(|(p, _)| p == port)
        })
        .collect()
}

/// Turns newly opened candidate ports into web endpoints. 80 and 443 are
/// kept even when silent.
pub fn promote_web_ports(ctx: &TargetContext, config: &ProbeConfig, prober: &dyn WebProber) -> ContextUpdate {
    let candidates = candidate_web_ports(ctx, config);
    let mut update = probe_ports(&ctx.target, &candidates, prober);
    for &(port, scheme) in FORCED_WEB_PORTS {
        let answered = update.web_endpoints.iter().any(|e| e.port == port);
        if candidates.contains(&port) && !answered {
            update.web_endpoints.insert(WebEndpoint::new(&ctx.target, port, scheme));
        }
    }
    update
}

/// https first, then the standard ports, then the lowest port.
pub fn best_endpoint(endpoints: &BTreeSet<WebEndpoint>) -> Option<&WebEndpoint> {
    endpoints.iter().min_by_key(|e| {
        (
            e.scheme != Scheme::Https,
            !matches!(e.port, 80 | 443),
            e.port,
        )
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Answers only for the configured (port, scheme) pairs and records calls.
    #[derive(Default)]
    pub struct MockProber {
        pub answers: BTreeMap<(u16, Scheme), ProbeResponse>,
        pub calls: Mutex<Vec<WebEndpoint>>,
    }

    impl MockProber {
        pub fn answering(pairs: &[(u16, Scheme, &[(&str, &str)])]) -> Self {
            let answers = pairs
                .iter()
                .map(|(port, scheme, headers)| {
                    let headers = headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    ((*port, *scheme), ProbeResponse { status: 200, headers })
                })
                .collect();
            Self {
                answers,
                calls: Mutex::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl WebProber for MockProber {
        fn probe(&self, endpoint: &WebEndpoint) -> Option<ProbeResponse> {
            self.calls.lock().unwrap().push(endpoint.clone());
            self.answers.get(&(endpoint.port, endpoint.scheme)).cloned()
        }
    }
}
