use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Result store location.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Raw article source. Column names differ between backends, so every
/// column the pipeline reads is configurable.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: String,
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_url_column")]
    pub url_column: String,
    #[serde(default = "default_content_column")]
    pub content_column: String,
    #[serde(default = "default_download_time_column")]
    pub download_time_column: String,
    #[serde(default = "default_publish_time_column")]
    pub publish_time_column: String,
    #[serde(default = "default_title_column")]
    pub title_column: String,
}

fn default_source_kind() -> String {
    "sqlite".to_string()
}
fn default_table() -> String {
    "articles".to_string()
}
fn default_url_column() -> String {
    "url".to_string()
}
fn default_content_column() -> String {
    "html_content".to_string()
}
fn default_download_time_column() -> String {
    "download_time".to_string()
}
fn default_publish_time_column() -> String {
    "publish_time".to_string()
}
fn default_title_column() -> String {
    "article_title".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Extra attempts for a failed chunk before the rest of its page is
    /// left for the next run.
    #[serde(default)]
    pub chunk_retries: u32,
    #[serde(default)]
    pub chunk_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            chunk_retries: 0,
            chunk_timeout_secs: None,
        }
    }
}

fn default_page_size() -> usize {
    100
}
fn default_chunk_size() -> usize {
    5
}

/// Attempt limit for the enrichment retry loop: a count, or the literal
/// string `"unbounded"`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttemptLimit {
    Count(u32),
    Unbounded(UnboundedKeyword),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum UnboundedKeyword {
    #[serde(rename = "unbounded")]
    Unbounded,
}

impl AttemptLimit {
    pub fn as_option(self) -> Option<u32> {
        match self {
            AttemptLimit::Count(n) => Some(n),
            AttemptLimit::Unbounded(_) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: AttemptLimit,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// Low-level retries on malformed output inside a single LLM call.
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            max_attempts: default_max_attempts(),
            deadline_secs: None,
            llm_max_retries: default_llm_max_retries(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    5
}
fn default_max_attempts() -> AttemptLimit {
    AttemptLimit::Unbounded(UnboundedKeyword::Unbounded)
}
fn default_llm_max_retries() -> u32 {
    3
}

impl RetryConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// One model/credential pair the provider gate may hand out.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_requests_per_minute() -> u32 {
    15
}
fn default_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.source.kind != "sqlite" {
        anyhow::bail!(
            "Unknown source kind: '{}'. Must be sqlite.",
            config.source.kind
        );
    }

    if config.pipeline.page_size == 0 {
        anyhow::bail!("pipeline.page_size must be > 0");
    }
    if config.pipeline.chunk_size == 0 {
        anyhow::bail!("pipeline.chunk_size must be > 0");
    }
    if config.pipeline.chunk_timeout_secs == Some(0) {
        anyhow::bail!("pipeline.chunk_timeout_secs must be > 0 when set");
    }

    if config.retry.max_attempts == AttemptLimit::Count(0) {
        anyhow::bail!("retry.max_attempts must be >= 1 or \"unbounded\"");
    }

    for provider in &config.providers {
        if provider.requests_per_minute == 0 {
            anyhow::bail!(
                "providers.{}: requests_per_minute must be > 0",
                provider.name
            );
        }
        if provider.model.trim().is_empty() {
            anyhow::bail!("providers.{}: model must be specified", provider.name);
        }
    }

    Ok(config)
}
