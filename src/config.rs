//! TOML configuration parsing and validation.
//!
//! The configuration is loaded once at start-up by [`load_config`] and then
//! passed by reference into every stage. Nothing mutates it afterwards.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_true")]
    pub clean_text: bool,
    #[serde(default)]
    pub archive: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            language: default_language(),
            include_globs: default_include_globs(),
            clean_text: true,
            archive: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_language() -> String {
    "en".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}
fn default_true() -> bool {
    true
}

/// One `(owner, repo, path)` triple to harvest.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub path: String,
    /// Branch, tag or commit; the repository default when unset.
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub repos: Vec<RepoDescriptor>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            repos: Vec::new(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}
fn default_overlap() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-ada-002".to_string())
}
fn default_embedding_dims() -> Option<usize> {
    Some(1536)
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_llm_max_tokens(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
            url: None,
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_max_tokens() -> usize {
    1000
}
fn default_llm_retries() -> u32 {
    3
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_mode")]
    pub mode: String,
    #[serde(default = "default_exit_command")]
    pub exit_command: String,
    /// Explicit dataset; the newest harvested file is used when unset.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: default_chat_mode(),
            exit_command: default_exit_command(),
            dataset: None,
        }
    }
}

fn default_chat_mode() -> String {
    "memory".to_string()
}
fn default_exit_command() -> String {
    "exit".to_string()
}

impl Config {
    /// Configuration with every section at its default and the database
    /// under `data/`. Used by tests and tooling that only need a shape.
    pub fn minimal() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            github: GitHubConfig::default(),
            db: DbConfig {
                path: PathBuf::from("data/docchat.sqlite"),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    if config.harvest.include_globs.is_empty() {
        anyhow::bail!("harvest.include_globs must not be empty");
    }
    for repo in &config.github.repos {
        if repo.owner.trim().is_empty() || repo.repo.trim().is_empty() {
            anyhow::bail!("github.repos entries need a non-empty owner and repo");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.llm.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be openai.", other),
    }

    match config.chat.mode.as_str() {
        "qa" | "memory" => {}
        other => anyhow::bail!("Unknown chat mode: '{}'. Must be qa or memory.", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = parse(
            r#"
            [db]
            path = "data/docchat.sqlite"

            [[github.repos]]
            owner = "octo"
            repo = "docs"
            path = "guides"
            "#,
        )
        .unwrap();

        assert_eq!(config.github.repos.len(), 1);
        assert_eq!(config.github.repos[0].path, "guides");
        assert_eq!(config.github.repos[0].branch, None);
        assert_eq!(config.harvest.language, "en");
        assert_eq!(config.harvest.include_globs, vec!["**/*.md", "**/*.mdx"]);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.chat.mode, "memory");
        assert_eq!(config.embedding.dims, Some(1536));
    }

    #[test]
    fn rejects_overlap_not_below_max() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [chunking]
            max_tokens = 10
            overlap_tokens = 10
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn rejects_unknown_chat_mode() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [chat]
            mode = "telepathy"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown chat mode"));
    }

    #[test]
    fn rejects_enabled_embedding_without_dims() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn partial_embedding_table_keeps_model_defaults() {
        let config = parse(
            r#"
            [db]
            path = "x.sqlite"
            [embedding]
            batch_size = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(
            config.embedding.model.as_deref(),
            Some("text-embedding-ada-002")
        );
        assert_eq!(config.embedding.dims, Some(1536));
    }

    #[test]
    fn minimal_config_is_valid() {
        validate(&Config::minimal()).unwrap();
    }

    #[test]
    fn example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/docchat.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.github.repos[0].repo, "transformers");
        assert_eq!(config.llm.max_tokens, 1000);
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    }
}
