//! fastembed-backed [`ModelLoader`].
//!
//! Named models are downloaded from Hugging Face on first use and cached.
//! Path sources load a user-defined ONNX model from a directory containing
//! `model.onnx`, `tokenizer.json`, `config.json`, `special_tokens_map.json`
//! and `tokenizer_config.json`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, InitOptions, InitOptionsUserDefined, TextEmbedding, TokenizerFiles,
    UserDefinedEmbeddingModel,
};
use ragtrace_core::{RagError, Result};

use super::{LocalModel, ModelLoader, ModelSource};

/// Loads fastembed models.
#[derive(Debug, Default, Clone)]
pub struct FastembedLoader {
    /// Download cache; fastembed's default when unset.
    pub cache_dir: Option<PathBuf>,
}

impl ModelLoader for FastembedLoader {
    fn load(&self, source: &ModelSource) -> Result<Box<dyn LocalModel>> {
        let model_load = |e: String| RagError::ModelLoad {
            model: source.to_string(),
            message: e,
        };

        let mut embedding = match source {
            ModelSource::Named(name) => {
                let mut options = InitOptions::new(named_model(name)?);
                if let Some(dir) = &self.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }
                TextEmbedding::try_new(options).map_err(|e| model_load(e.to_string()))?
            }
            ModelSource::Path(dir) => {
                let model = read_user_defined(dir).map_err(|e| model_load(e.to_string()))?;
                TextEmbedding::try_new_from_user_defined(model, InitOptionsUserDefined::default())
                    .map_err(|e| model_load(e.to_string()))?
            }
        };

        let mut probe = embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| model_load(format!("probe embedding failed: {}", e)))?;
        let dims = probe.pop().map(|v| v.len()).unwrap_or(0);
        if dims == 0 {
            return Err(model_load("model produced an empty embedding".to_string()));
        }

        Ok(Box::new(FastembedModel {
            name: source.to_string(),
            dims,
            inner: Mutex::new(embedding),
        }))
    }
}

struct FastembedModel {
    name: String,
    dims: usize,
    inner: Mutex<TextEmbedding>,
}

impl LocalModel for FastembedModel {
    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut model = self.inner.lock().map_err(|_| RagError::Provider {
            provider: self.name.clone(),
            message: "model lock poisoned".to_string(),
        })?;
        model.embed(texts, None).map_err(|e| RagError::Provider {
            provider: self.name.clone(),
            message: e.to_string(),
        })
    }
}

fn named_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(RagError::config(format!(
            "unknown local embedding model '{}'; supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}

fn read_user_defined(dir: &Path) -> std::io::Result<UserDefinedEmbeddingModel> {
    let read = |file: &str| std::fs::read(dir.join(file));
    let tokenizer_files = TokenizerFiles {
        tokenizer_file: read("tokenizer.json")?,
        config_file: read("config.json")?,
        special_tokens_map_file: read("special_tokens_map.json")?,
        tokenizer_config_file: read("tokenizer_config.json")?,
    };
    Ok(UserDefinedEmbeddingModel::new(read("model.onnx")?, tokenizer_files))
}
