use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct RunDirs {
    pub root: PathBuf,      // <output_root>/<run id>
    pub scans: PathBuf,     // raw tool output
    pub report: PathBuf,
    pub wordlists: PathBuf, // synthesized fallback lists
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proto::Tcp => f.write_str("tcp"),
            Proto::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A `(host, port, scheme)` triple believed to serve HTTP(S).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WebEndpoint {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl WebEndpoint {
    pub fn new(host: impl Into<String>, port: u16, scheme: Scheme) -> Self {
        Self {
            host: host.into(),
            port,
            scheme,
        }
    }

    pub fn url(&self) -> String {
        let default_port = matches!(
            (self.scheme, self.port),
            (Scheme::Http, 80) | (Scheme::Https, 443)
        );
        if default_port {
            format!("{}://{}", self.scheme.as_str(), self.host)
        } else {
            format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    NetworkDiscovery,
    DomainIntel,
    WebAnalysis,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::NetworkDiscovery, Phase::DomainIntel, Phase::WebAnalysis];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::NetworkDiscovery => "network discovery",
            Phase::DomainIntel => "domain intelligence",
            Phase::WebAnalysis => "web analysis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_omits_default_ports() {
        assert_eq!(WebEndpoint::new("10.0.0.1", 80, Scheme::Http).url(), "http://10.0.0.1");
        assert_eq!(WebEndpoint::new("box.htb", 443, Scheme::Https).url(), "https://box.htb");
        assert_eq!(
            WebEndpoint::new("10.0.0.1", 8443, Scheme::Https).url(),
            "https://10.0.0.1:8443"
        );
    }
}
