//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only contract the retriever relies on:
//! append entries, then query by similarity. There is no update or delete.
//!
//! Ingestion needs `&mut` access while querying needs only `&`, so a store
//! that has been moved into an `Arc` for retrieval can no longer be written
//! to. Population therefore always completes before retrieval begins.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryVectorStore;

/// Append-only store of chunk vectors with nearest-neighbour query.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Append chunks with their vectors |
/// | [`query`](VectorStore::query) | Top-k chunks by cosine similarity |
/// | [`len`](VectorStore::len) | Number of stored entries |
/// | [`dims`](VectorStore::dims) | Dimensionality fixed by the first insert |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append `chunks[i]` with `vectors[i]`.
    ///
    /// Fails with [`RagError::Config`](crate::RagError::Config) when the
    /// slices differ in length and with
    /// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch)
    /// when a vector's length differs from the store's dimensionality.
    /// On error nothing is appended.
    async fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()>;

    /// Return up to `k` entries ranked by descending similarity to `vector`.
    ///
    /// Ties keep insertion order. An empty store yields an empty result.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of stored vectors, `None` until the first insert.
    fn dims(&self) -> Option<usize>;
}
