use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Default configuration written by `aicrawler init`.
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../default.yaml");

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sources: Sources,

    #[serde(default)]
    pub summarization: Summarization,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Sources {
    #[serde(default)]
    pub feeds: Vec<Feed>,

    #[serde(default)]
    pub apis: Apis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Apis {
    #[serde(default)]
    pub newsapi: NewsApi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsApi {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_newsapi_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_newsapi_query")]
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Summarization {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Output {
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_newsapi_key_env() -> String {
    "NEWSAPI_KEY".to_string()
}

fn default_newsapi_query() -> String {
    "artificial intelligence software development".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for NewsApi {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_key_env: default_newsapi_key_env(),
            query: default_newsapi_query(),
        }
    }
}

impl Default for Summarization {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            openai_model: default_openai_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Config directory: `~/.config/aicrawler`.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aicrawler")
}

/// Data directory default: `~/.local/share/aicrawler`.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aicrawler")
}

/// Finds the config file: explicit path > ~/.config/aicrawler/config.yaml > ./config.yaml.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(path.to_path_buf());
    }

    let xdg_config = config_dir().join("config.yaml");
    if xdg_config.exists() {
        return Ok(xdg_config);
    }

    let cwd_config = PathBuf::from("config.yaml");
    if cwd_config.exists() {
        return Ok(cwd_config);
    }

    Err(AppError::Config(format!(
        "no config file found; searched:\n  {}\n  ./config.yaml\n\nRun 'aicrawler init' to create a default config",
        xdg_config.display()
    )))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Effective data directory from config or XDG default.
    pub fn effective_data_dir(&self) -> PathBuf {
        if self.output.data_dir.is_empty() {
            data_dir()
        } else {
            PathBuf::from(&self.output.data_dir)
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.effective_data_dir().join("aicrawler.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_applies_defaults_for_missing_fields() {
        let cfg = Config::parse("sources:\n  feeds:\n    - url: https://example.com/feed\n").unwrap();
        assert_eq!(cfg.sources.feeds.len(), 1);
        assert_eq!(cfg.summarization.provider, "ollama");
        assert_eq!(cfg.summarization.max_tokens, 512);
        assert_eq!(cfg.server.port, 8000);
        assert!(cfg.sources.apis.newsapi.enabled);
        assert_eq!(cfg.sources.apis.newsapi.api_key_env, "NEWSAPI_KEY");
    }

    #[test]
    fn parse_overrides_defaults_field_by_field() {
        let cfg = Config::parse("summarization:\n  provider: openai\nserver:\n  port: 9000\n").unwrap();
        assert_eq!(cfg.summarization.provider, "openai");
        // Untouched sibling fields keep their defaults.
        assert_eq!(cfg.summarization.model, "qwen2.5:7b");
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn default_config_yaml_parses() {
        let cfg = Config::parse(DEFAULT_CONFIG_YAML).unwrap();
        assert!(!cfg.sources.feeds.is_empty());
        assert_eq!(cfg.logging.level, "INFO");
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = Config::parse("{}").unwrap();
        assert!(cfg.sources.feeds.is_empty());
        assert_eq!(cfg.summarization.embedding_model, "nomic-embed-text");
    }
}
