//! # ragtrace
//!
//! A retrieval-augmented question answering pipeline that records a trace of
//! every answer.
//!
//! ragtrace loads web pages and local files, splits them into overlapping
//! chunks, embeds them into an in-memory vector index, and answers questions
//! by retrieving the closest chunks, filling a prompt template, and calling a
//! generator behind an optional safety gate. Each answer comes with a
//! [`ResponseTrace`](ragtrace_core::pipeline::ResponseTrace): the template,
//! retrieved documents, rendered prompt, response, and elapsed time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │   Loaders   │──▶│ Chunk+Embed │──▶│  In-memory  │
//! │  Web/Files  │   │  (ingest)   │   │ vector store│
//! └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                           │
//!                 retrieve → format → generate (+ safety)
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │(ragtrace)│        │  (axum)  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragtrace init                          # write config/ragtrace.toml
//! ragtrace chunk                         # load + chunk, print counts
//! ragtrace ask "What is an agent?"       # answer, write cache/response.json
//! ragtrace serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`loader`] | Web page and local file loading, HTML extraction |
//! | [`ingest`] | Chunk, embed, and index documents |
//! | [`embedding`] | OpenAI and local embedding providers |
//! | [`generator`] | OpenAI and Ollama generators |
//! | [`safety`] | Blocklist and Llama Guard safety checkers |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`ask`] | Pipeline assembly and the `ask` command |
//! | [`response_log`] | `response.json` writer |
//! | [`session`] | Student and teacher chat state |
//! | [`server`] | HTTP API |
//!
//! The provider-independent pieces (chunker, vector store, retriever,
//! prompt assembler, safety gate, pipeline) live in the `ragtrace-core`
//! crate and are re-exported as [`core`].

pub use ragtrace_core as core;

pub mod ask;
pub mod config;
pub mod embedding;
pub mod generator;
pub mod http;
pub mod ingest;
pub mod loader;
pub mod response_log;
pub mod safety;
pub mod server;
pub mod session;
