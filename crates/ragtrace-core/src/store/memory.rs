//! In-memory [`VectorStore`] implementation.
//!
//! Entries live in a `Vec` in insertion order. Queries are brute-force
//! cosine similarity over every stored vector followed by a stable sort, so
//! equal scores keep insertion order.

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

use super::VectorStore;

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: Vec<Entry>,
    dims: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::config(format!(
                "got {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut dims = self.dims;
        for v in &vectors {
            match dims {
                Some(expected) if expected != v.len() => {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: v.len(),
                    });
                }
                Some(_) => {}
                None => dims = Some(v.len()),
            }
        }

        self.dims = dims;
        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| Entry { chunk, vector }),
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dims {
            if expected != vector.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let sim = cosine_similarity(vector, &e.vector);
                (i, if sim.is_nan() { f32::MIN } else { sim })
            })
            .collect();
        // sort_by is stable: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }
}
