use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WIKI_URL: &str = "https://escapefromtarkov.fandom.com";
pub const DEFAULT_USER_AGENT: &str = "tarkovdata/0.1";
pub const DEFAULT_RATE_LIMIT_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DataConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub rate_limit_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
}

impl DataConfig {
    /// Resolve the wiki base URL: env TARKOV_WIKI_URL > config > DEFAULT_WIKI_URL.
    pub fn wiki_url(&self) -> String {
        self.wiki_url_with_lookup(|key| env::var(key).ok())
    }

    fn wiki_url_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = non_empty(lookup_env("TARKOV_WIKI_URL"))
            .or_else(|| self.wiki.base_url.clone())
            .unwrap_or_else(|| DEFAULT_WIKI_URL.to_string());
        raw.trim().trim_end_matches('/').to_string()
    }

    /// Resolve user agent: env TARKOV_WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        non_empty(env::var("TARKOV_WIKI_USER_AGENT").ok())
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn rate_limit_ms(&self) -> u64 {
        env_u64("TARKOV_WIKI_RATE_LIMIT_MS")
            .or(self.wiki.rate_limit_ms)
            .unwrap_or(DEFAULT_RATE_LIMIT_MS)
    }

    pub fn timeout_ms(&self) -> u64 {
        env_u64("TARKOV_WIKI_TIMEOUT_MS")
            .or(self.wiki.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Retries are off unless configured.
    pub fn max_retries(&self) -> usize {
        env::var("TARKOV_WIKI_RETRIES")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .or(self.wiki.max_retries)
            .unwrap_or(0)
    }

    /// Absolute URL for a wiki article, e.g. `page_url("Ammunition")`.
    pub fn page_url(&self, title: &str) -> String {
        format!("{}/wiki/{}", self.wiki_url(), title.trim().replace(' ', "_"))
    }
}

/// Load and parse a DataConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DataConfig> {
    if !config_path.exists() {
        return Ok(DataConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DataConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# tarkovdata configuration (materialized by `tarkovdata init`)\n\n[wiki]\nbase_url = \"{DEFAULT_WIKI_URL}\"\n# user_agent = \"{DEFAULT_USER_AGENT}\"\nrate_limit_ms = {DEFAULT_RATE_LIMIT_MS}\ntimeout_ms = {DEFAULT_TIMEOUT_MS}\n# max_retries = 0\n"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_overrides() {
        let config = DataConfig::default();
        assert!(config.wiki.base_url.is_none());
        assert!(config.wiki.rate_limit_ms.is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, DataConfig::default());
    }

    #[test]
    fn load_config_parses_wiki_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
base_url = "https://wiki.example.org/"
user_agent = "test-agent/1.0"
rate_limit_ms = 250
timeout_ms = 1000
max_retries = 2
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.base_url.as_deref(),
            Some("https://wiki.example.org/")
        );
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.wiki.rate_limit_ms, Some(250));
        assert_eq!(config.wiki.timeout_ms, Some(1000));
        assert_eq!(config.wiki.max_retries, Some(2));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nbase_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn wiki_url_prefers_env_and_trims_trailing_slash() {
        let config = DataConfig {
            wiki: WikiSection {
                base_url: Some("https://from-config.example/".to_string()),
                ..WikiSection::default()
            },
        };
        assert_eq!(
            config.wiki_url_with_lookup(|_| None),
            "https://from-config.example"
        );
        assert_eq!(
            config.wiki_url_with_lookup(|_| Some(" https://from-env.example ".to_string())),
            "https://from-env.example"
        );
        assert_eq!(
            DataConfig::default().wiki_url_with_lookup(|_| Some("   ".to_string())),
            DEFAULT_WIKI_URL
        );
    }

    #[test]
    fn rendered_default_config_round_trips() {
        let parsed: DataConfig = toml::from_str(&render_default_config()).expect("parse");
        assert_eq!(parsed.wiki.base_url.as_deref(), Some(DEFAULT_WIKI_URL));
        assert_eq!(parsed.wiki.rate_limit_ms, Some(DEFAULT_RATE_LIMIT_MS));
    }
}
