//! Core data models that flow through ingestion and retrieval.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ordered key/value metadata attached to documents and chunks.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key holding the source identifier (URL or file path).
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding a chunk's character offset within its document.
pub const START_INDEX_KEY: &str = "start_index";

/// A loaded source document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the source (see [`Document::new`]).
    pub id: String,
    /// Source identifier (URL or file path).
    pub source: String,
    /// Extracted text content.
    pub content: String,
    /// Always contains [`SOURCE_KEY`].
    pub metadata: Metadata,
}

impl Document {
    /// Create a document; the id is the first 16 bytes of the SHA-256 of
    /// `source`, hex encoded, so reloading a source yields the same id.
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let source = source.into();
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.clone().into());
        Self {
            id: document_id(&source),
            source,
            content: content.into(),
            metadata,
        }
    }

    /// Attach an extra metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Content length in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

fn document_id(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// A contiguous, possibly overlapping, segment of a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Position of this chunk within its document, starting at 0.
    pub index: usize,
    pub content: String,
    /// Character offset of the first character within the source document.
    pub start_index: usize,
    /// Document metadata plus [`START_INDEX_KEY`].
    pub metadata: Metadata,
}

impl Chunk {
    /// Chunk length in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
