//! Ingestion: documents → chunks → embeddings → vector store.
//!
//! Also hosts the `load` and `chunk` CLI commands, which run the first
//! stages of ingestion without embedding anything.

use anyhow::Result as AnyResult;
use ragtrace_core::chunk::{Chunker, FixedSizeChunker};
use ragtrace_core::embedding::EmbeddingProvider;
use ragtrace_core::models::Document;
use ragtrace_core::store::VectorStore;
use ragtrace_core::Result;
use tracing::{debug, info};

use crate::config::Config;
use crate::loader::load_sources;

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
}

/// Chunk, embed (in batches of `batch_size`), and store every document.
///
/// Requires exclusive access to the store, so no query can run while
/// ingestion is in progress. The first error aborts the run; documents
/// stored before it stay in the store.
pub async fn ingest_documents(
    documents: &[Document],
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingProvider,
    store: &mut dyn VectorStore,
    batch_size: usize,
) -> Result<IngestStats> {
    let batch_size = batch_size.max(1);
    let mut stats = IngestStats::default();

    for doc in documents {
        let chunks = chunker.chunk(doc);
        if chunks.is_empty() {
            debug!(source = %doc.source, "document produced no chunks");
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            vectors.extend(embedder.embed_batch(batch).await?);
        }

        let count = chunks.len();
        store.add(chunks, vectors).await?;
        stats.documents += 1;
        stats.chunks += count;
        debug!(source = %doc.source, chunks = count, "ingested document");
    }

    info!(
        documents = stats.documents,
        chunks = stats.chunks,
        model = embedder.model_name(),
        "ingestion complete"
    );
    Ok(stats)
}

/// `ragtrace load`: list the documents the configured sources produce.
pub async fn run_load(config: &Config) -> AnyResult<()> {
    let documents = load_sources(&config.sources).await?;
    for doc in &documents {
        let title = doc
            .metadata
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("-");
        println!("{}  {} chars  {}", doc.source, doc.char_len(), title);
    }
    println!("documents: {}", documents.len());
    Ok(())
}

/// `ragtrace chunk`: per-document chunk counts under the configured chunking.
pub async fn run_chunk(config: &Config) -> AnyResult<()> {
    let chunker = FixedSizeChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let documents = load_sources(&config.sources).await?;

    let mut total = 0;
    for doc in &documents {
        let count = chunker.chunk(doc).len();
        total += count;
        println!("{}  {} chunks", doc.source, count);
    }
    println!("documents: {}", documents.len());
    println!("chunks: {}", total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragtrace_core::store::InMemoryVectorStore;
    use ragtrace_core::RagError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RagError::Network {
                    provider: "counting".to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn embedder(fail: bool) -> CountingEmbedder {
        CountingEmbedder {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[tokio::test]
    async fn test_ingest_counts_and_batches() {
        let docs = vec![
            Document::new("a", "x".repeat(25)),
            Document::new("b", ""),
            Document::new("c", "y".repeat(5)),
        ];
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        let embedder = embedder(false);
        let mut store = InMemoryVectorStore::new();

        let stats = ingest_documents(&docs, &chunker, &embedder, &mut store, 2)
            .await
            .unwrap();

        // 25 chars, size 10, overlap 2 → ceil(23 / 8) = 3 chunks; plus 1.
        assert_eq!(stats, IngestStats { documents: 2, chunks: 4 });
        assert_eq!(store.len(), 4);
        // Doc a: batches of 2 → 2 calls; doc c: 1 call.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts() {
        let docs = vec![Document::new("a", "some text")];
        let chunker = FixedSizeChunker::new(100, 10).unwrap();
        let mut store = InMemoryVectorStore::new();
        let err = ingest_documents(&docs, &chunker, &embedder(true), &mut store, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Network { .. }));
        assert!(store.is_empty());
    }
}
