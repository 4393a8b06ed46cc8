//! Fixed-size, overlapping text chunker.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `chunk_size` characters,
//! where each chunk after the first starts `chunk_size - chunk_overlap`
//! characters after the previous one. Offsets and lengths are counted in
//! Unicode scalar values, never bytes, so multi-byte text is never split
//! inside a character.
//!
//! Each chunk inherits the document's metadata and records its character
//! offset under `start_index`.
//!
//! # Algorithm
//!
//! 1. Validate `chunk_overlap < chunk_size` (construction time).
//! 2. Let `stride = chunk_size - chunk_overlap`.
//! 3. Emit `[start, min(start + chunk_size, L))` for `start = 0, stride, 2·stride, …`
//!    until a chunk reaches the end of the document.
//!
//! For a document of `L > chunk_size` characters this yields
//! `ceil((L - chunk_overlap) / stride)` chunks; `1..=chunk_size` characters
//! yield one chunk and an empty document yields none.
//!
//! # Example
//!
//! ```rust
//! use ragtrace_core::chunk::{Chunker, FixedSizeChunker};
//! use ragtrace_core::models::Document;
//!
//! let chunker = FixedSizeChunker::new(10, 4).unwrap();
//! let chunks = chunker.chunk(&Document::new("doc", "abcdefghijklmnop"));
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].start_index, 6);
//! ```

use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, START_INDEX_KEY};

/// Splits documents into chunks.
pub trait Chunker: Send + Sync {
    /// Produce the ordered chunks of `document`. Pure: no side effects.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Character-window chunker with exact overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// [`RagError::Config`] if `chunk_size == 0` or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of chunks [`chunk`](Chunker::chunk) produces for a document of
    /// `len` characters, without materializing them.
    pub fn expected_chunks(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.chunk_size {
            1
        } else {
            (len - self.chunk_overlap).div_ceil(self.stride())
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        // Byte offset of every char, plus the end of the string, so that
        // char positions map to valid slice boundaries.
        let mut boundaries: Vec<usize> = document.content.char_indices().map(|(i, _)| i).collect();
        let len = boundaries.len();
        boundaries.push(document.content.len());

        let mut chunks = Vec::with_capacity(self.expected_chunks(len));
        let mut start = 0;
        while start < len {
            let end = (start + self.chunk_size).min(len);
            let text = &document.content[boundaries[start]..boundaries[end]];
            chunks.push(make_chunk(document, chunks.len(), start, text));
            if end == len {
                break;
            }
            start += self.stride();
        }
        chunks
    }
}

fn make_chunk(document: &Document, index: usize, start_index: usize, text: &str) -> Chunk {
    let mut metadata = document.metadata.clone();
    metadata.insert(START_INDEX_KEY.to_string(), start_index.into());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        index,
        content: text.to_string(),
        start_index,
        metadata,
    }
}
