//! # ragtrace core
//!
//! Backend-independent logic for ragtrace: data models, chunking, the vector
//! store abstraction, retrieval, prompt assembly, the generation safety gate,
//! and the staged RAG pipeline with trace capture.
//!
//! This crate performs no network or filesystem I/O. Concrete embedding
//! providers, generators, document loaders and the response log live in the
//! `ragtrace` application crate.
//!
//! ## Data Flow
//!
//! ```text
//! Document ──▶ Chunker ──▶ EmbeddingProvider ──▶ VectorStore
//!                                                    │
//!   query ──▶ Retriever ──▶ PromptAssembler ──▶ Generator ──▶ ResponseTrace
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod store;

pub use error::{RagError, Result};
