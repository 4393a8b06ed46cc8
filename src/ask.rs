//! Pipeline assembly and the `ask` command.
//!
//! [`build_pipeline`] turns a [`Config`] into a ready [`RagPipeline`]:
//!
//! ```text
//! load sources → chunk → embed → InMemoryVectorStore ─┐
//!                                                      ▼
//!                      Retriever + PromptAssembler + Generator → RagPipeline
//! ```
//!
//! Ingestion owns the store mutably; it is frozen behind an `Arc` before
//! the retriever sees it, so queries never run against a half-built index.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ragtrace_core::chunk::FixedSizeChunker;
use ragtrace_core::embedding::EmbeddingProvider;
use ragtrace_core::generation::Generator;
use ragtrace_core::models::Document;
use ragtrace_core::pipeline::{format_elapsed, RagPipeline};
use ragtrace_core::prompt::PromptAssembler;
use ragtrace_core::retriever::Retriever;
use ragtrace_core::store::{InMemoryVectorStore, VectorStore};
use tracing::info;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generator::create_generator;
use crate::ingest::{ingest_documents, IngestStats};
use crate::loader::load_sources;
use crate::response_log::{render_trace, save_response};

/// Load the configured sources and build a pipeline over them.
pub async fn build_pipeline(config: &Config) -> Result<(RagPipeline, IngestStats)> {
    let documents = load_sources(&config.sources)
        .await
        .context("Failed to load sources")?;
    let embedder = create_embedder(&config.embedding)
        .await
        .context("Failed to initialize embedding provider")?;
    let generator = create_generator(config).context("Failed to initialize generator")?;
    build_pipeline_with(config, &documents, embedder, generator).await
}

/// Build a pipeline over `documents` with explicit providers.
pub async fn build_pipeline_with(
    config: &Config,
    documents: &[Document],
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
) -> Result<(RagPipeline, IngestStats)> {
    let chunker = FixedSizeChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let mut store = InMemoryVectorStore::new();
    let stats = ingest_documents(
        documents,
        &chunker,
        &*embedder,
        &mut store,
        config.embedding.batch_size,
    )
    .await
    .context("Ingestion failed")?;

    let store: Arc<dyn VectorStore> = Arc::new(store);
    let retriever = Retriever::new(
        store,
        embedder,
        config.retrieval.search_type()?,
        config.retrieval.k,
    )?;
    let assembler = PromptAssembler::new(config.prompt.load_template()?);

    let mut pipeline = RagPipeline::new(retriever, assembler, generator);
    if let Some(secs) = config.generator.deadline_secs {
        pipeline = pipeline.with_generation_deadline(Duration::from_secs(secs));
    }
    info!(
        documents = stats.documents,
        chunks = stats.chunks,
        k = config.retrieval.k,
        "pipeline ready"
    );
    Ok((pipeline, stats))
}

/// `ragtrace ask`: answer one query, print it, and write the response log.
pub async fn run_ask(config: &Config, query: &str, json: bool, save: bool) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let (pipeline, _) = build_pipeline(config).await?;
    let trace = pipeline.answer(query).await?;

    if json {
        println!("{}", render_trace(&trace)?);
    } else {
        match trace.response_text() {
            Some(text) => println!("{}", text),
            None => println!("(response suppressed by safety checks)"),
        }
        println!();
        let mut sources: Vec<&str> = Vec::new();
        for doc in &trace.docs {
            if let Some(source) = doc.metadata.get("source").and_then(|s| s.as_str()) {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        println!("sources ({} chunks):", trace.docs.len());
        for source in sources {
            println!("  {}", source);
        }
        println!("time: {}", format_elapsed(trace.elapsed));
    }

    if save {
        let path = save_response(&trace, &config.output.dir)
            .with_context(|| format!("Failed to write response log to {}", config.output.dir.display()))?;
        if !json {
            println!("saved: {}", path.display());
        }
    }
    Ok(())
}
