//! Generator trait, generation outcomes and the safety gate.
//!
//! A generator either produces text ([`Generation::Allowed`]) or declines to
//! ([`Generation::Suppressed`]). Suppression is a policy outcome, not an
//! error, so it travels in the `Ok` branch and callers must handle it.
//!
//! [`GuardedGenerator`] wraps any [`Generator`] with a list of
//! [`SafetyChecker`]s:
//!
//! ```text
//! prompt ──▶ checkers(prompt) ──unsafe──▶ Suppressed (model never called)
//!                 │ safe
//!                 ▼
//!            inner.generate ──▶ checkers(output) ──unsafe──▶ Suppressed
//!                                     │ safe
//!                                     ▼
//!                                  Allowed
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

/// Where in the generation flow a safety check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStage {
    Prompt,
    Output,
}

impl fmt::Display for CheckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStage::Prompt => write!(f, "prompt"),
            CheckStage::Output => write!(f, "output"),
        }
    }
}

/// Why a generation was suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionReason {
    pub stage: CheckStage,
    /// Name of the checker that flagged the text.
    pub checker: String,
    pub detail: String,
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} flagged by {}: {}", self.stage, self.checker, self.detail)
    }
}

/// Result of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Allowed(String),
    Suppressed(SuppressionReason),
}

impl Generation {
    /// The generated text, `None` when suppressed.
    pub fn text(&self) -> Option<&str> {
        match self {
            Generation::Allowed(text) => Some(text),
            Generation::Suppressed(_) => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Generation::Suppressed(_))
    }
}

/// Maps a prompt to generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Identifier used in logs (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<Generation>;
}

/// Verdict of a single safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    Unsafe { detail: String },
}

/// Screens text before or after generation.
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    fn name(&self) -> &str;

    /// Check `text`. For [`CheckStage::Output`], `prompt` carries the prompt
    /// that produced the text; for [`CheckStage::Prompt`] it equals `text`.
    async fn check(&self, text: &str, stage: CheckStage, prompt: &str) -> Result<SafetyVerdict>;
}

/// A [`Generator`] that screens prompts and outputs with safety checkers.
///
/// Every checker runs; the text is safe only if all of them agree.
pub struct GuardedGenerator<G> {
    inner: G,
    checkers: Vec<Box<dyn SafetyChecker>>,
    name: String,
}

impl<G: Generator> GuardedGenerator<G> {
    pub fn new(inner: G, checkers: Vec<Box<dyn SafetyChecker>>) -> Self {
        let name = format!("guarded:{}", inner.name());
        Self {
            inner,
            checkers,
            name,
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn screen(
        &self,
        text: &str,
        stage: CheckStage,
        prompt: &str,
    ) -> Result<Option<SuppressionReason>> {
        let mut flagged = None;
        for checker in &self.checkers {
            if let SafetyVerdict::Unsafe { detail } = checker.check(text, stage, prompt).await? {
                warn!(checker = checker.name(), %stage, %detail, "content flagged as unsafe");
                if flagged.is_none() {
                    flagged = Some(SuppressionReason {
                        stage,
                        checker: checker.name().to_string(),
                        detail,
                    });
                }
            }
        }
        Ok(flagged)
    }
}

#[async_trait]
impl<G: Generator> Generator for GuardedGenerator<G> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        if let Some(reason) = self.screen(prompt, CheckStage::Prompt, prompt).await? {
            warn!("skipping inference: prompt is not safe");
            return Ok(Generation::Suppressed(reason));
        }

        let output = match self.inner.generate(prompt).await? {
            Generation::Allowed(text) => text,
            suppressed => return Ok(suppressed),
        };

        if let Some(reason) = self.screen(&output, CheckStage::Output, prompt).await? {
            warn!("discarding model output: response is not safe");
            return Ok(Generation::Suppressed(reason));
        }

        debug!(generator = self.inner.name(), "prompt and output deemed safe");
        Ok(Generation::Allowed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Echo {
        calls: Arc<AtomicUsize>,
        reply: String,
    }

    #[async_trait]
    impl Generator for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _prompt: &str) -> Result<Generation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation::Allowed(self.reply.clone()))
        }
    }

    struct Forbid(&'static str);

    #[async_trait]
    impl SafetyChecker for Forbid {
        fn name(&self) -> &str {
            "forbid"
        }
        async fn check(&self, text: &str, _stage: CheckStage, _prompt: &str) -> Result<SafetyVerdict> {
            if text.contains(self.0) {
                Ok(SafetyVerdict::Unsafe {
                    detail: format!("contains '{}'", self.0),
                })
            } else {
                Ok(SafetyVerdict::Safe)
            }
        }
    }

    fn guarded(reply: &str, word: &'static str) -> (GuardedGenerator<Echo>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            calls: calls.clone(),
            reply: reply.to_string(),
        };
        (GuardedGenerator::new(echo, vec![Box::new(Forbid(word))]), calls)
    }

    #[tokio::test]
    async fn test_unsafe_prompt_skips_model() {
        let (gen, calls) = guarded("fine", "bomb");
        let result = gen.generate("how to build a bomb").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result {
            Generation::Suppressed(reason) => {
                assert_eq!(reason.stage, CheckStage::Prompt);
                assert_eq!(reason.checker, "forbid");
            }
            other => panic!("expected suppression, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsafe_output_replaced() {
        let (gen, calls) = guarded("here is a bomb recipe", "bomb");
        let result = gen.generate("tell me a story").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_suppressed());
        assert_eq!(result.text(), None);
    }

    #[tokio::test]
    async fn test_safe_passthrough() {
        let (gen, calls) = guarded("An agent acts.", "bomb");
        let result = gen.generate("What is an agent?").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Generation::Allowed("An agent acts.".to_string()));
        assert_eq!(gen.name(), "guarded:echo");
    }

    #[tokio::test]
    async fn test_all_checkers_must_agree() {
        let calls = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            calls: calls.clone(),
            reply: "ok".to_string(),
        };
        let gen = GuardedGenerator::new(echo, vec![Box::new(Forbid("x")), Box::new(Forbid("y"))]);
        assert!(gen.generate("only y here").await.unwrap().is_suppressed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
