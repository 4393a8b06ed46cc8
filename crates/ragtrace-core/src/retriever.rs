//! Retriever: a vector store queried with a fixed search policy.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::models::ScoredChunk;
use crate::store::VectorStore;

/// How retrieved candidates are selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchType {
    /// Plain top-k by similarity.
    Similarity,
    /// Top-k, then drop results scoring below `threshold`.
    SimilarityScoreThreshold { threshold: f32 },
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Similarity => write!(f, "similarity"),
            SearchType::SimilarityScoreThreshold { threshold } => {
                write!(f, "similarity_score_threshold({})", threshold)
            }
        }
    }
}

/// Embeds a query and fetches the top-k chunks from a [`VectorStore`].
///
/// The embedder must be the one used to populate the store.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    search_type: SearchType,
    k: usize,
}

impl Retriever {
    /// # Errors
    ///
    /// [`RagError::Config`] if `k == 0` or a score threshold lies outside `[-1, 1]`.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        search_type: SearchType,
        k: usize,
    ) -> Result<Self> {
        if k == 0 {
            return Err(RagError::config("retrieval k must be >= 1"));
        }
        if let SearchType::SimilarityScoreThreshold { threshold } = search_type {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(RagError::config(format!(
                    "score threshold {} must be in [-1.0, 1.0]",
                    threshold
                )));
            }
        }
        Ok(Self {
            store,
            embedder,
            search_type,
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    /// Return up to `k` chunks ranked by descending similarity to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed(query).await?;
        let mut results = self.store.query(&query_vec, self.k).await?;

        if let SearchType::SimilarityScoreThreshold { threshold } = self.search_type {
            results.retain(|r| r.score >= threshold);
        }

        debug!(
            search_type = %self.search_type,
            k = self.k,
            returned = results.len(),
            "retrieved chunks"
        );
        Ok(results)
    }
}
