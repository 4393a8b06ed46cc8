//! Configuration parsing.
//!
//! ragtrace reads a single TOML file (default `./config/ragtrace.toml`).
//! Every section is optional and falls back to the defaults below, so an
//! empty file is a valid configuration that ingests nothing.
//!
//! ```toml
//! [sources]
//! urls = ["https://lilianweng.github.io/posts/2023-06-23-agent/"]
//! paths = ["./docs"]
//! extract_classes = ["post-title", "post-header", "post-content"]
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "openai"            # or "local"
//! model = "text-embedding-3-small"
//!
//! [retrieval]
//! search_type = "similarity"
//! k = 6
//!
//! [prompt]
//! template = "grounded"          # or "concise", or set template_path
//!
//! [generator]
//! provider = "openai"            # or "local" (Ollama, always safety-gated)
//! model = "gpt-4o-mini"
//!
//! [safety]
//! checkers = ["llama_guard"]
//!
//! [output]
//! dir = "./cache"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use ragtrace_core::prompt::PromptTemplate;
use ragtrace_core::retriever::SearchType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::RetryPolicy;

/// Environment variable consulted when no `api_key` is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ============ [sources] ============

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Web pages to fetch.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Local files or directories (`file://` prefixes are accepted).
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// HTML elements carrying one of these classes are kept; everything else
    /// is dropped. An empty list keeps the whole `<body>`.
    #[serde(default = "default_extract_classes")]
    pub extract_classes: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            paths: Vec::new(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            extract_classes: default_extract_classes(),
            follow_symlinks: false,
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.html".to_string(),
    ]
}

fn default_extract_classes() -> Vec<String> {
    vec![
        "post-title".to_string(),
        "post-header".to_string(),
        "post-content".to_string(),
    ]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

// ============ [chunking] ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

// ============ [embedding] ============

/// Which embedding backend to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` API.
    #[default]
    #[serde(alias = "remote")]
    OpenAi,
    /// Local ONNX model with a one-shot fallback path.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingBackend,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Secondary local model directory, tried once if the primary fails to load.
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            model: None,
            dims: None,
            base_url: default_openai_base_url(),
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            timeout_secs: default_embedding_timeout_secs(),
            fallback_path: None,
        }
    }
}

impl EmbeddingConfig {
    /// Configured model, or the backend's default.
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider) {
            (Some(m), _) => m.clone(),
            (None, EmbeddingBackend::OpenAi) => "text-embedding-3-small".to_string(),
            (None, EmbeddingBackend::Local) => "all-minilm-l6-v2".to_string(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
/// Upper bound on `retry_base_ms`; the longest backoff is 32 times this.
const MAX_RETRY_BASE_MS: u64 = 60_000;

fn default_retry_base_ms() -> u64 {
    1000
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

// ============ [retrieval] ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    #[default]
    Similarity,
    SimilarityScoreThreshold,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub search_type: SearchKind,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Required when `search_type = "similarity_score_threshold"`.
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: SearchKind::default(),
            k: default_k(),
            score_threshold: None,
        }
    }
}

impl RetrievalConfig {
    pub fn search_type(&self) -> Result<SearchType> {
        match self.search_type {
            SearchKind::Similarity => Ok(SearchType::Similarity),
            SearchKind::SimilarityScoreThreshold => {
                let threshold = self.score_threshold.ok_or_else(|| {
                    anyhow::anyhow!(
                        "retrieval.score_threshold is required for similarity_score_threshold"
                    )
                })?;
                Ok(SearchType::SimilarityScoreThreshold { threshold })
            }
        }
    }
}

fn default_k() -> usize {
    6
}

// ============ [prompt] ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    Grounded,
    Concise,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    #[serde(default)]
    pub template: TemplateKind,
    /// A template file; overrides `template` when set.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

impl PromptConfig {
    /// Resolve the configured template, reading `template_path` if set.
    pub fn load_template(&self) -> Result<PromptTemplate> {
        if let Some(path) = &self.template_path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
            return PromptTemplate::new(text)
                .with_context(|| format!("Invalid prompt template: {}", path.display()));
        }
        Ok(match self.template {
            TemplateKind::Grounded => PromptTemplate::grounded(),
            TemplateKind::Concise => PromptTemplate::concise(),
        })
    }
}

// ============ [generator] ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// OpenAI-compatible `/chat/completions` API.
    #[default]
    #[serde(alias = "remote")]
    OpenAi,
    /// Local inference served by Ollama; always safety-gated.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub provider: GeneratorBackend,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Ollama endpoint for the local backend.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generator_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Fail a generation that takes longer than this.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorBackend::default(),
            model: None,
            base_url: default_openai_base_url(),
            api_key: None,
            url: default_ollama_url(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_new_tokens: default_max_new_tokens(),
            seed: default_seed(),
            repetition_penalty: default_repetition_penalty(),
            timeout_secs: default_generator_timeout_secs(),
            max_retries: default_generator_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            deadline_secs: None,
        }
    }
}

impl GeneratorConfig {
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider) {
            (Some(m), _) => m.clone(),
            (None, GeneratorBackend::OpenAi) => "gpt-4o-mini".to_string(),
            (None, GeneratorBackend::Local) => "llama3.1:8b".to_string(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_p() -> f32 {
    1.0
}
fn default_top_k() -> u32 {
    50
}
fn default_max_new_tokens() -> u32 {
    200
}
fn default_seed() -> u64 {
    42
}
fn default_repetition_penalty() -> f32 {
    1.0
}
fn default_generator_timeout_secs() -> u64 {
    120
}
fn default_generator_max_retries() -> u32 {
    3
}

// ============ [safety] ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckerKind {
    /// Case-insensitive regex patterns from `safety.blocklist`.
    Blocklist,
    /// A guard model served by Ollama.
    LlamaGuard,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_checkers")]
    pub checkers: Vec<CheckerKind>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default = "default_guard_model")]
    pub guard_model: String,
    /// Ollama endpoint for the guard model; defaults to `generator.url`.
    #[serde(default)]
    pub guard_url: Option<String>,
    /// Also gate the remote generator.
    #[serde(default)]
    pub guard_remote: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            checkers: default_checkers(),
            blocklist: Vec::new(),
            guard_model: default_guard_model(),
            guard_url: None,
            guard_remote: false,
        }
    }
}

fn default_checkers() -> Vec<CheckerKind> {
    vec![CheckerKind::LlamaGuard]
}
fn default_guard_model() -> String {
    "llama-guard3".to_string()
}

// ============ [output] / [server] ============

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Directory receiving `response.json`.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// Configured key, else the `OPENAI_API_KEY` environment variable.
pub fn resolve_api_key(configured: &Option<String>) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
}

/// Starter configuration written by `ragtrace init`.
pub const EXAMPLE_CONFIG: &str = r#"# ragtrace configuration

[sources]
urls = ["https://lilianweng.github.io/posts/2023-06-23-agent/"]
paths = []
extract_classes = ["post-title", "post-header", "post-content"]

[chunking]
chunk_size = 1000
chunk_overlap = 200

[embedding]
provider = "openai"
model = "text-embedding-3-small"
# api_key = "..."   # defaults to $OPENAI_API_KEY

[retrieval]
search_type = "similarity"
k = 6

[prompt]
template = "grounded"

[generator]
provider = "openai"
model = "gpt-4o-mini"

[safety]
checkers = ["llama_guard"]
guard_model = "llama-guard3"

[output]
dir = "./cache"

[server]
bind = "127.0.0.1:7340"
"#;

/// Write [`EXAMPLE_CONFIG`] to `path`, refusing to overwrite unless `force`.
pub fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Chunking
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        // Retrieval
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if let SearchType::SimilarityScoreThreshold { threshold } = self.retrieval.search_type()? {
            if !(-1.0..=1.0).contains(&threshold) {
                bail!("retrieval.score_threshold must be in [-1.0, 1.0]");
            }
        }

        // Embedding
        if self.embedding.model_name().trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.retry_base_ms > MAX_RETRY_BASE_MS {
            bail!("embedding.retry_base_ms must be <= {}", MAX_RETRY_BASE_MS);
        }

        // Generator
        if self.generator.model_name().trim().is_empty() {
            bail!("generator.model must not be empty");
        }
        if self.generator.deadline_secs == Some(0) {
            bail!("generator.deadline_secs must be > 0");
        }
        if self.generator.retry_base_ms > MAX_RETRY_BASE_MS {
            bail!("generator.retry_base_ms must be <= {}", MAX_RETRY_BASE_MS);
        }
        if self.generator.provider == GeneratorBackend::Local && self.safety.checkers.is_empty() {
            bail!("the local generator requires at least one entry in safety.checkers");
        }

        // Safety
        if self.safety.checkers.contains(&CheckerKind::Blocklist) && self.safety.blocklist.is_empty()
        {
            bail!("safety.blocklist must not be empty when the blocklist checker is enabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.retrieval.k, 6);
        assert_eq!(cfg.retrieval.search_type().unwrap(), SearchType::Similarity);
        assert_eq!(cfg.embedding.provider, EmbeddingBackend::OpenAi);
        assert_eq!(cfg.generator.model_name(), "gpt-4o-mini");
        assert_eq!(cfg.sources.extract_classes.len(), 3);
        assert_eq!(cfg.output.dir, PathBuf::from("./cache"));
    }

    #[test]
    fn test_provider_enums() {
        let cfg = parse_config(
            r#"
[embedding]
provider = "local"

[generator]
provider = "remote"
"#,
        )
        .unwrap();
        assert_eq!(cfg.embedding.provider, EmbeddingBackend::Local);
        assert_eq!(cfg.embedding.model_name(), "all-minilm-l6-v2");
        assert_eq!(cfg.generator.provider, GeneratorBackend::OpenAi);

        assert!(parse_config("[embedding]\nprovider = \"huggingface\"").is_err());
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100").unwrap_err();
        assert!(format!("{:#}", err).contains("chunk_overlap"));
        assert!(parse_config("[chunking]\nchunk_size = 0").is_err());
    }

    #[test]
    fn test_retry_base_is_bounded() {
        let err = parse_config("[embedding]\nretry_base_ms = 9223372036854775807").unwrap_err();
        assert!(format!("{:#}", err).contains("embedding.retry_base_ms"));
        let err = parse_config("[generator]\nretry_base_ms = 60001").unwrap_err();
        assert!(format!("{:#}", err).contains("generator.retry_base_ms"));
        assert!(parse_config("[generator]\nretry_base_ms = 60000").is_ok());
    }

    #[test]
    fn test_threshold_requires_value() {
        assert!(parse_config("[retrieval]\nsearch_type = \"similarity_score_threshold\"").is_err());
        let cfg = parse_config(
            "[retrieval]\nsearch_type = \"similarity_score_threshold\"\nscore_threshold = 0.3",
        )
        .unwrap();
        assert_eq!(
            cfg.retrieval.search_type().unwrap(),
            SearchType::SimilarityScoreThreshold { threshold: 0.3 }
        );
        assert!(parse_config("[retrieval]\nk = 0").is_err());
    }

    #[test]
    fn test_local_generator_needs_checkers() {
        assert!(parse_config("[generator]\nprovider = \"local\"\n[safety]\ncheckers = []").is_err());
        assert!(parse_config("[safety]\ncheckers = [\"blocklist\"]").is_err());
        let cfg = parse_config(
            "[generator]\nprovider = \"local\"\n[safety]\ncheckers = [\"blocklist\"]\nblocklist = [\"bomb\"]",
        )
        .unwrap();
        assert_eq!(cfg.safety.checkers, vec![CheckerKind::Blocklist]);
    }

    #[test]
    fn test_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Q: {question}\nC: {context}").unwrap();
        let cfg = PromptConfig {
            template: TemplateKind::Grounded,
            template_path: Some(good),
        };
        assert_eq!(cfg.load_template().unwrap().as_str(), "Q: {question}\nC: {context}");

        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "no placeholders").unwrap();
        let cfg = PromptConfig {
            template: TemplateKind::Grounded,
            template_path: Some(bad),
        };
        assert!(cfg.load_template().is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg = parse_config(EXAMPLE_CONFIG).unwrap();
        assert_eq!(cfg.sources.urls.len(), 1);
        assert_eq!(cfg.retrieval.k, 6);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/ragtrace.toml");
        write_example_config(&path, false).unwrap();
        assert!(write_example_config(&path, false).is_err());
        write_example_config(&path, true).unwrap();
        assert!(load_config(&path).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/ragtrace.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
