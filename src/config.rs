use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional per-stage model overrides; fall back to `model`.
    #[serde(default)]
    pub reading_model: Option<String>,
    #[serde(default)]
    pub codebook_model: Option<String>,
    #[serde(default)]
    pub chunking_model: Option<String>,
    #[serde(default)]
    pub coding_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            reading_model: None,
            codebook_model: None,
            chunking_model: None,
            coding_model: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Maximum number of per-document units in flight at once (Stage 2).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Load a config file if it exists, otherwise fall back to defaults.
///
/// Analysis runs work out of the box with only `OPENAI_API_KEY` set; the
/// config file is for tuning.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    match config.llm.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be openai.", other),
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.llm.model.is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }

    if config.analysis.max_concurrent_requests == 0 {
        anyhow::bail!("analysis.max_concurrent_requests must be >= 1");
    }

    if config.documents.include_globs.is_empty() {
        anyhow::bail!("documents.include_globs must not be empty");
    }

    Ok(())
}
