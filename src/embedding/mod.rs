//! Embedding provider implementations.
//!
//! Implements [`EmbeddingProvider`] for two backends, selected by
//! `[embedding] provider`:
//! - **[`OpenAiEmbedder`]**: calls an OpenAI-compatible `POST /embeddings`
//!   endpoint with batching and retry/backoff.
//! - **[`LocalEmbedder`]**: runs a local model on a blocking thread. Loading
//!   goes through the [`ModelLoader`] seam; the ONNX backend is fastembed
//!   behind the `local-embeddings-fastembed` feature.
//!
//! # Local fallback
//!
//! ```text
//! load(primary) ──ok──▶ ready
//!      │ ModelLoad error
//!      ▼
//! warn + load(fallback path) ──ok──▶ ready
//!      │ any error
//!      ▼
//! RagError::ModelLoad
//! ```
//!
//! Only [`RagError::ModelLoad`] triggers the fallback. Any other failure,
//! such as an unknown model name ([`RagError::Config`]), is returned
//! immediately. The remote backend never falls back.

#[cfg(feature = "local-embeddings-fastembed")]
mod onnx;

#[cfg(feature = "local-embeddings-fastembed")]
pub use onnx::FastembedLoader;

use async_trait::async_trait;
use ragtrace_core::embedding::EmbeddingProvider;
use ragtrace_core::{RagError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{resolve_api_key, EmbeddingBackend, EmbeddingConfig};
use crate::http::{build_client, post_json_with_retry, RetryPolicy};

/// Secondary model directory used when `[embedding] fallback_path` is unset.
pub const DEFAULT_FALLBACK_PATH: &str = "./models/all-MiniLM-L6-v2";

// ============ OpenAI-compatible ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// Texts are sent in batches of at most `batch_size` per request. Vectors
/// come back in input order (the response `index` field is honoured).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    policy: RetryPolicy,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// [`RagError::Config`] if no API key is available or `dims` is unknown
    /// for the model.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model_name();
        let dims = config
            .dims
            .or_else(|| known_openai_dims(&model))
            .ok_or_else(|| {
                RagError::config(format!(
                    "embedding.dims is required for model '{}'",
                    model
                ))
            })?;
        let api_key = resolve_api_key(&config.api_key).ok_or_else(|| {
            RagError::config("no API key: set embedding.api_key or OPENAI_API_KEY")
        })?;

        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            dims,
            batch_size: config.batch_size.max(1),
            policy: config.retry_policy(),
        })
    }

    async fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            &self.client,
            "openai-embeddings",
            &self.endpoint,
            Some(&self.api_key),
            &body,
            &self.policy,
        )
        .await?;

        let vectors = parse_openai_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(RagError::Provider {
                provider: "openai-embeddings".to_string(),
                message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            });
        }
        for v in &vectors {
            if v.len() != self.dims {
                return Err(RagError::DimensionMismatch {
                    expected: self.dims,
                    actual: v.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_request(batch).await?);
        }
        debug!(model = %self.model, texts = texts.len(), "embedded batch");
        Ok(out)
    }
}

fn known_openai_dims(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| RagError::Provider {
        provider: "openai-embeddings".to_string(),
        message: format!("invalid response: {}", what),
    };

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;
        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| invalid("non-numeric value")))
            .collect::<Result<_>>()?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local ============

/// Where to load a local model from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A model identifier known to the backend (downloaded and cached).
    Named(String),
    /// A directory holding the model files.
    Path(PathBuf),
}

impl ModelSource {
    /// Existing directories and anything shaped like a path (contains a
    /// separator, or starts with `.` or `~`) become [`ModelSource::Path`];
    /// bare identifiers become [`ModelSource::Named`].
    ///
    /// A path that does not exist stays a path, so loading it fails with
    /// [`RagError::ModelLoad`] and the fallback gets its turn.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if Path::new(spec).is_dir() || looks_like_path(spec) {
            ModelSource::Path(expand_home(spec))
        } else {
            ModelSource::Named(spec.to_string())
        }
    }
}

fn looks_like_path(spec: &str) -> bool {
    spec.contains('/') || spec.contains('\\') || spec.starts_with('.') || spec.starts_with('~')
}

fn expand_home(spec: &str) -> PathBuf {
    match (spec.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(spec),
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Named(name) => write!(f, "{}", name),
            ModelSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A loaded local embedding model. Calls block the current thread.
pub trait LocalModel: Send + Sync {
    fn dims(&self) -> usize;
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Loads local models. Calls block the current thread.
pub trait ModelLoader: Send + Sync {
    /// # Errors
    ///
    /// [`RagError::ModelLoad`] when the model exists in principle but cannot
    /// be loaded (missing or corrupt files, download failure). Other variants
    /// for problems a fallback cannot fix.
    fn load(&self, source: &ModelSource) -> Result<Box<dyn LocalModel>>;
}

/// Embedding provider backed by a local model.
pub struct LocalEmbedder {
    name: String,
    dims: usize,
    model: Arc<dyn LocalModel>,
}

impl fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("name", &self.name)
            .field("dims", &self.dims)
            .finish()
    }
}

impl LocalEmbedder {
    /// Load `primary`, retrying once with `fallback` on a model-load failure.
    pub async fn load(
        loader: Arc<dyn ModelLoader>,
        primary: ModelSource,
        fallback: Option<ModelSource>,
    ) -> Result<Self> {
        let first = load_blocking(loader.clone(), primary.clone()).await;
        let (source, model) = match first {
            Ok(model) => (primary, model),
            Err(e) if e.is_model_load() => {
                let Some(fallback) = fallback else {
                    return Err(e);
                };
                warn!(
                    primary = %primary,
                    fallback = %fallback,
                    error = %e,
                    "failed to load embedding model, trying fallback"
                );
                match load_blocking(loader, fallback.clone()).await {
                    Ok(model) => (fallback, model),
                    Err(e2) => {
                        return Err(RagError::ModelLoad {
                            model: fallback.to_string(),
                            message: format!(
                                "fallback failed after primary '{}' failed ({}): {}",
                                primary, e, e2
                            ),
                        })
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let dims = model.dims();
        info!(model = %source, dims, "loaded local embedding model");
        Ok(Self {
            name: source.to_string(),
            dims,
            model: Arc::from(model),
        })
    }
}

async fn load_blocking(
    loader: Arc<dyn ModelLoader>,
    source: ModelSource,
) -> Result<Box<dyn LocalModel>> {
    let label = source.to_string();
    tokio::task::spawn_blocking(move || loader.load(&source))
        .await
        .map_err(|e| RagError::ModelLoad {
            model: label,
            message: format!("loader task failed: {}", e),
        })?
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.clone();
        let texts = texts.to_vec();
        let expected = texts.len();
        let vectors = tokio::task::spawn_blocking(move || model.embed(texts))
            .await
            .map_err(|e| RagError::Provider {
                provider: self.name.clone(),
                message: format!("embedding task failed: {}", e),
            })??;

        if vectors.len() != expected {
            return Err(RagError::Provider {
                provider: self.name.clone(),
                message: format!("expected {} embeddings, got {}", expected, vectors.len()),
            });
        }
        Ok(vectors)
    }
}

/// The loader for `[embedding] provider = "local"`.
#[cfg(feature = "local-embeddings-fastembed")]
fn default_loader() -> Result<Arc<dyn ModelLoader>> {
    Ok(Arc::new(FastembedLoader::default()))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
fn default_loader() -> Result<Arc<dyn ModelLoader>> {
    Err(RagError::config(
        "the local embedding provider requires building with --features local-embeddings-fastembed",
    ))
}

/// Instantiate the provider selected by `config.provider`.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingBackend::OpenAi => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        EmbeddingBackend::Local => {
            let loader = default_loader()?;
            Ok(Arc::new(create_local_embedder(config, loader).await?))
        }
    }
}

/// Build a [`LocalEmbedder`] from config with an explicit loader.
pub async fn create_local_embedder(
    config: &EmbeddingConfig,
    loader: Arc<dyn ModelLoader>,
) -> Result<LocalEmbedder> {
    let primary = ModelSource::parse(&config.model_name());
    let fallback = ModelSource::Path(
        config
            .fallback_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_PATH)),
    );
    let embedder = LocalEmbedder::load(loader, primary, Some(fallback)).await?;
    if let Some(dims) = config.dims {
        if dims != embedder.dims() {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: embedder.dims(),
            });
        }
    }
    Ok(embedder)
}
