use super::types::Config;
use crate::core::errors::IpsnipeError;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATHS: &[&str] = &["./ipsnipe.toml", "./config.toml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// `custom_path` first, then the default search paths, then defaults.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Config> {
        if let Some(path) = custom_path {
            if path.exists() {
                return Self::load_from_file(path)
                    .with_context(|| format!("Failed to load config from custom path: {:?}", path));
            }
            tracing::warn!("Custom config path does not exist: {:?}, falling back to defaults", path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from: {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {:#}", path, e);
                        continue;
                    }
                }
            }
        }

        tracing::info!("No configuration file found, using default settings");
        Ok(Config::default())
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        if let Some(dirs) = ProjectDirs::from("", "", "ipsnipe") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::load_from_str(&content)
            .with_context(|| format!("Invalid configuration in {:?}", path))
    }

    pub fn load_from_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML config")?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn validate_config(config: &Config) -> Result<(), IpsnipeError> {
        let bail = |msg: String| Err(IpsnipeError::Config(msg));

        if config.general.scan_timeout_s == 0 {
            return bail("general.scan_timeout_s must be greater than 0".into());
        }
        if config.probe.timeout_s == 0 {
            return bail("probe.timeout_s must be greater than 0".into());
        }

        let wl = &config.wordlists;
        if wl.small_max_lines >= wl.medium_max_lines {
            return bail("wordlists.small_max_lines must be less than medium_max_lines".into());
        }
        if wl.sample_bytes == 0 {
            return bail("wordlists.sample_bytes must be greater than 0".into());
        }
        if !(wl.weights.size_decay > 0.0 && wl.weights.size_decay <= 1.0) {
            return bail("wordlists.weights.size_decay must be in (0, 1]".into());
        }
        if !(0.0..=1.0).contains(&wl.weights.confidence_floor) {
            return bail("wordlists.weights.confidence_floor must be in [0, 1]".into());
        }

        for (name, tool) in &config.tools {
            if tool.timeout_s == Some(0) {
                return bail(format!("tools.{name}.timeout_s must be greater than 0"));
            }
            if tool.success_codes.as_ref().is_some_and(|c| c.is_empty()) {
                return bail(format!("tools.{name}.success_codes cannot be empty"));
            }
            if let Some(extra) = &tool.extra_args {
                if let Err(e) = shell_words::split(extra) {
                    return bail(format!("tools.{name}.extra_args: {e}"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordlists::SizeClass;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_file() {
        let config = ConfigLoader::load_from_str("").unwrap();
        assert_eq!(config.general.scan_timeout_s, 300);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.probe.ports.len(), 12);
        assert!(config.is_enabled("nikto"));
    }

    #[test]
    fn test_load_from_custom_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[general]
scan_timeout_s = 60
grace_period_ms = 250

[tools.nikto]
enabled = false

[tools.feroxbuster]
timeout_s = 900
threads = 20
wordlist_size = "small"
extra_args = "--dont-filter -C 404"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_with_custom_path(Some(file.path())).unwrap();
        assert_eq!(config.grace_period(), Duration::from_millis(250));
        assert!(!config.is_enabled("nikto"));
        assert_eq!(config.timeout_for("feroxbuster"), Duration::from_secs(900));
        assert_eq!(config.timeout_for("whatweb"), Duration::from_secs(60));
        let ferox = config.tool("feroxbuster");
        assert_eq!(ferox.threads, Some(20));
        assert_eq!(ferox.wordlist_size, Some(SizeClass::Small));
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let err = ConfigLoader::load_from_str(
            "[wordlists]\nsmall_max_lines = 100\nmedium_max_lines = 10\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("small_max_lines"));
    }

    #[test]
    fn test_rejects_unbalanced_extra_args() {
        let err = ConfigLoader::load_from_str("[tools.ffuf_vhost]\nextra_args = \"-H 'Host\"\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("extra_args"));
    }

    #[test]
    fn test_custom_categories_replace_defaults() {
        let config = ConfigLoader::load_from_str(
            r#"
[[wordlists.categories]]
category = "api"
keywords = ["rest"]
"#,
        )
        .unwrap();
        assert_eq!(config.wordlists.categories.len(), 1);
        // untouched keys keep their defaults
        assert_eq!(config.wordlists.small_max_lines, 5_000);
    }
}
