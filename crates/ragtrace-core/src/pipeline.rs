//! The RAG request pipeline.
//!
//! [`RagPipeline`] answers a query by running three typed [`Step`]s in
//! order, each consuming the previous step's output:
//!
//! ```text
//! Idle ─▶ Retrieving ─▶ Formatting ─▶ Generating ─▶ Done
//!            │              │             │
//!            └──────────────┴─────────────┴──▶ Failed
//! ```
//!
//! | Step | Input | Output |
//! |------|-------|--------|
//! | [`RetrieveStep`] | query `String` | [`Retrieved`] |
//! | [`FormatStep`] | [`Retrieved`] | [`Prompt`] |
//! | [`GenerateStep`] | [`Prompt`] | [`Generation`] |
//!
//! Trace data is recorded between steps and returned as a
//! [`ResponseTrace`]. A suppressed generation ends in `Done`. A collaborator
//! error moves the run to `Failed` and is returned to the caller unchanged;
//! the pipeline never retries.
//!
//! Stages never overlap within one call. Concurrent calls share the
//! pipeline read-only.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tracing::{debug, error, info};

use crate::error::{RagError, Result};
use crate::generation::{Generation, Generator};
use crate::models::{Metadata, ScoredChunk};
use crate::prompt::{Prompt, PromptAssembler};
use crate::retriever::Retriever;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Retrieving,
    Formatting,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Retrieving => "retrieving",
            Stage::Formatting => "formatting",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One typed transformation in the pipeline.
#[async_trait]
pub trait Step: Send + Sync {
    type Input: Send + 'static;
    type Output: Send;

    /// The state the pipeline is in while this step runs.
    const STAGE: Stage;

    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Output of [`RetrieveStep`].
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub query: String,
    pub chunks: Vec<ScoredChunk>,
}

/// Embeds the query and fetches ranked chunks.
pub struct RetrieveStep {
    retriever: Retriever,
}

#[async_trait]
impl Step for RetrieveStep {
    type Input = String;
    type Output = Retrieved;
    const STAGE: Stage = Stage::Retrieving;

    async fn run(&self, query: String) -> Result<Retrieved> {
        let chunks = self.retriever.retrieve(&query).await?;
        Ok(Retrieved { query, chunks })
    }
}

/// Renders the retrieved context and query into a prompt.
pub struct FormatStep {
    assembler: PromptAssembler,
}

#[async_trait]
impl Step for FormatStep {
    type Input = Retrieved;
    type Output = Prompt;
    const STAGE: Stage = Stage::Formatting;

    async fn run(&self, retrieved: Retrieved) -> Result<Prompt> {
        Ok(self.assembler.assemble(&retrieved.chunks, &retrieved.query))
    }
}

/// Invokes the generator, optionally under a deadline.
pub struct GenerateStep {
    generator: Arc<dyn Generator>,
    deadline: Option<Duration>,
}

#[async_trait]
impl Step for GenerateStep {
    type Input = Prompt;
    type Output = Generation;
    const STAGE: Stage = Stage::Generating;

    async fn run(&self, prompt: Prompt) -> Result<Generation> {
        let call = self.generator.generate(&prompt.rendered);
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| RagError::Timeout {
                    stage: format!("generation ({})", self.generator.name()),
                    after: deadline,
                })?,
            None => call.await,
        }
    }
}

/// Stage bookkeeping for a single `answer` call.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    stage: Stage,
    history: Vec<Stage>,
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    /// Current state.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "pipeline transition");
        self.stage = stage;
        self.history.push(stage);
    }

    async fn advance<S: Step>(&mut self, step: &S, input: S::Input) -> Result<S::Output> {
        self.enter(S::STAGE);
        match step.run(input).await {
            Ok(output) => Ok(output),
            Err(e) => {
                error!(stage = %S::STAGE, error = %e, "pipeline stage failed");
                self.enter(Stage::Failed);
                Err(e)
            }
        }
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

/// A retrieved chunk as recorded in the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracedDoc {
    pub page_content: String,
    pub metadata: Metadata,
}

impl From<&ScoredChunk> for TracedDoc {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            page_content: scored.chunk.content.clone(),
            metadata: scored.chunk.metadata.clone(),
        }
    }
}

/// Everything recorded while answering one query.
///
/// Serializes to the response-log shape:
///
/// ```json
/// {
///     "prompt template": "...",
///     "docs": [{ "page_content": "...", "metadata": { "source": "..." } }],
///     "input": "...",
///     "response": "..." ,
///     "time": "1.234 sec"
/// }
/// ```
///
/// `response` is `null` when the generation was suppressed.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseTrace {
    #[serde(rename = "prompt template")]
    pub prompt_template: String,
    pub docs: Vec<TracedDoc>,
    /// The rendered prompt sent to the generator.
    pub input: String,
    #[serde(serialize_with = "serialize_generation")]
    pub response: Generation,
    #[serde(rename = "time", serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

impl ResponseTrace {
    pub fn response_text(&self) -> Option<&str> {
        self.response.text()
    }
}

fn serialize_generation<S: Serializer>(
    generation: &Generation,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    generation.text().serialize(serializer)
}

fn serialize_elapsed<S: Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_elapsed(*elapsed))
}

/// Format a duration as seconds, e.g. `"1.234 sec"`.
///
/// Millisecond precision; sub-millisecond durations keep microsecond
/// precision so a completed run never reads as zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 0.001 {
        format!("{:.6} sec", secs)
    } else {
        format!("{:.3} sec", secs)
    }
}

/// Retrieve → Format → Generate, with trace capture.
pub struct RagPipeline {
    retrieve: RetrieveStep,
    format: FormatStep,
    generate: GenerateStep,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            retrieve: RetrieveStep { retriever },
            format: FormatStep { assembler },
            generate: GenerateStep {
                generator,
                deadline: None,
            },
        }
    }

    /// Fail generation with [`RagError::Timeout`] if it runs longer than `deadline`.
    pub fn with_generation_deadline(mut self, deadline: Duration) -> Self {
        self.generate.deadline = Some(deadline);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retrieve.retriever
    }

    /// Answer `query`, returning the full trace.
    pub async fn answer(&self, query: &str) -> Result<ResponseTrace> {
        self.run(query, &mut PipelineRun::new()).await
    }

    /// Like [`answer`](Self::answer), recording stage transitions in `run`.
    pub async fn run(&self, query: &str, run: &mut PipelineRun) -> Result<ResponseTrace> {
        let started = Instant::now();

        let retrieved = run.advance(&self.retrieve, query.to_string()).await?;
        let docs: Vec<TracedDoc> = retrieved.chunks.iter().map(TracedDoc::from).collect();

        let prompt = run.advance(&self.format, retrieved).await?;
        let prompt_template = prompt.template.clone();
        let input = prompt.rendered.clone();

        let response = run.advance(&self.generate, prompt).await?;
        let elapsed = started.elapsed();
        run.enter(Stage::Done);

        info!(
            docs = docs.len(),
            suppressed = response.is_suppressed(),
            elapsed = %format_elapsed(elapsed),
            "answered query"
        );

        Ok(ResponseTrace {
            prompt_template,
            docs,
            input,
            response,
            elapsed,
        })
    }
}
