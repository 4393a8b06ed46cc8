//! Prompt assembly.
//!
//! Retrieved chunk contents are joined with a blank line (`"\n\n"`) in
//! retrieval order to form the `{context}`; the user query fills
//! `{question}`. Substitution is a single left-to-right pass over the
//! template, so placeholder-like text inside the context or the query is
//! left untouched.
//!
//! The default [`PromptTemplate::grounded`] template restricts the answer
//! to the supplied context and tells the model to say it does not know when
//! the context is insufficient.

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::ScoredChunk;

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

const GROUNDED_TEMPLATE: &str = "User:\n\
Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer. \
Use three sentences maximum and keep the answer as concise as possible. \
Always say \"thanks for asking!\" at the end of the answer.\n\
Context:\n{context}\n\
Question:\n{question}\n\
Answer:";

const CONCISE_TEMPLATE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question} \n\
Context: {context} \n\
Answer:";

/// A validated template containing `{context}` and `{question}` exactly once each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Validate and wrap a template string.
    ///
    /// # Errors
    ///
    /// [`RagError::Config`] unless `{context}` and `{question}` each occur exactly once.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for placeholder in [CONTEXT, QUESTION] {
            let count = text.matches(placeholder).count();
            if count != 1 {
                return Err(RagError::config(format!(
                    "prompt template must contain {} exactly once (found {})",
                    placeholder, count
                )));
            }
        }
        Ok(Self { text })
    }

    /// Grounded answer, three sentences maximum, "don't know" fallback and a
    /// fixed closing phrase.
    pub fn grounded() -> Self {
        Self {
            text: GROUNDED_TEMPLATE.to_string(),
        }
    }

    /// Shorter grounded template without the closing phrase.
    pub fn concise() -> Self {
        Self {
            text: CONCISE_TEMPLATE.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + context.len() + question.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with(CONTEXT) {
                out.push_str(context);
                rest = &tail[CONTEXT.len()..];
            } else if tail.starts_with(QUESTION) {
                out.push_str(question);
                rest = &tail[QUESTION.len()..];
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::grounded()
    }
}

/// A rendered, generation-ready prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// The template the prompt was rendered from.
    pub template: String,
    /// The final prompt text.
    pub rendered: String,
}

/// Renders retrieved context and a query into a [`Prompt`].
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Build the prompt for `query` from `chunks` (in retrieval order).
    pub fn assemble(&self, chunks: &[ScoredChunk], query: &str) -> Prompt {
        let context = format_context(chunks);
        Prompt {
            template: self.template.as_str().to_string(),
            rendered: self.template.render(&context, query),
        }
    }
}

/// Join chunk contents with exactly one blank line between them.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
