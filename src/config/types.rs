use crate::wordlists::{Category, SizeClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub probe: ProbeConfig,
    pub tools: BTreeMap<String, ToolConfig>,
    pub wordlists: WordlistsConfig,
}

impl Config {
    /// Settings for `tool`; tools absent from the file use defaults.
    pub fn tool(&self, tool: &str) -> ToolConfig {
        self.tools.get(tool).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, tool: &str) -> bool {
        self.tools.get(tool).is_none_or(|t| t.enabled)
    }

    pub fn timeout_for(&self, tool: &str) -> Duration {
        let secs = self
            .tools
            .get(tool)
            .and_then(|t| t.timeout_s)
            .unwrap_or(self.general.scan_timeout_s);
        Duration::from_secs(secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.general.grace_period_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub scan_timeout_s: u64,
    /// Time between SIGTERM and SIGKILL when a job is terminated.
    pub grace_period_ms: u64,
    pub enhanced_mode: bool,
    pub output_root: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            scan_timeout_s: 300,
            grace_period_ms: 5_000,
            enhanced_mode: false,
            output_root: PathBuf::from("ipsnipe_results"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ports: Vec<u16>,
    pub timeout_s: u64,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ports: vec![80, 443, 8080, 8443, 8000, 8888, 9000, 3000, 5000, 8008, 8181, 9090],
            timeout_s: 5,
            user_agent: format!("ipsnipe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    pub timeout_s: Option<u64>,
    /// Appended to the built-in arguments, split like a shell would.
    pub extra_args: Option<String>,
    pub success_codes: Option<Vec<i32>>,
    pub threads: Option<u32>,
    pub wordlist_size: Option<SizeClass>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_s: None,
            extra_args: None,
            success_codes: None,
            threads: None,
            wordlist_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WordlistRoot {
    pub path: PathBuf,
    #[serde(default = "default_priority")]
    pub priority: f64,
}

fn default_priority() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn new(category: Category, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub size_peak: SizeClass,
    pub size_decay: f64,
    pub context_bonus: f64,
    pub confidence_floor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            size_peak: SizeClass::Medium,
            size_decay: 0.6,
            context_bonus: 1.5,
            confidence_floor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WordlistsConfig {
    pub roots: Vec<WordlistRoot>,
    pub extensions: Vec<String>,
    pub small_max_lines: u64,
    pub medium_max_lines: u64,
    pub sample_bytes: u64,
    /// Checked in order; the first rule matching a path token wins.
    pub categories: Vec<CategoryRule>,
    pub weights: ScoringWeights,
}

impl Default for WordlistsConfig {
    fn default() -> Self {
        Self {
            roots: vec![
                WordlistRoot {
                    path: PathBuf::from("/usr/share/seclists"),
                    priority: 1.0,
                },
                WordlistRoot {
                    path: PathBuf::from("/usr/share/wordlists"),
                    priority: 0.5,
                },
                WordlistRoot {
                    path: PathBuf::from("/usr/share/dirb/wordlists"),
                    priority: 0.3,
                },
            ],
            extensions: vec!["txt".into(), "lst".into(), "list".into(), "dic".into()],
            small_max_lines: 5_000,
            medium_max_lines: 50_000,
            sample_bytes: 64 * 1024,
            categories: vec![
                CategoryRule::new(Category::Subdomain, &["subdomain", "dns", "vhost", "host"]),
                CategoryRule::new(Category::Api, &["api", "swagger", "graphql", "endpoint"]),
                CategoryRule::new(Category::Parameter, &["param", "arjun"]),
                CategoryRule::new(Category::FileExtension, &["extension"]),
                CategoryRule::new(
                    Category::Credential,
                    &["password", "passwd", "cred", "username", "rockyou", "leaked"],
                ),
                CategoryRule::new(
                    Category::Directory,
                    &["dir", "content", "common", "raft", "web", "cms", "fuzz"],
                ),
            ],
            weights: ScoringWeights::default(),
        }
    }
}
