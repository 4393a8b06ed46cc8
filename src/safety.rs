//! Safety checkers for the generation gate.
//!
//! - [`BlocklistChecker`]: flags text matching any configured regex
//!   (case-insensitive). No network.
//! - [`LlamaGuardChecker`]: asks a Llama Guard model served by Ollama to
//!   classify the conversation and parses its `safe` / `unsafe` verdict.
//!
//! Both plug into [`GuardedGenerator`](ragtrace_core::generation::GuardedGenerator).

use std::time::Duration;

use async_trait::async_trait;
use ragtrace_core::generation::{CheckStage, SafetyChecker, SafetyVerdict};
use ragtrace_core::{RagError, Result};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::{CheckerKind, GeneratorConfig, SafetyConfig};
use crate::http::{build_client, post_json_with_retry, RetryPolicy};

/// Flags text matching any of a set of patterns.
pub struct BlocklistChecker {
    patterns: Vec<Regex>,
}

impl BlocklistChecker {
    /// # Errors
    ///
    /// [`RagError::Config`] for an invalid pattern.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| RagError::config(format!("invalid blocklist pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl SafetyChecker for BlocklistChecker {
    fn name(&self) -> &str {
        "blocklist"
    }

    async fn check(&self, text: &str, _stage: CheckStage, _prompt: &str) -> Result<SafetyVerdict> {
        match self.patterns.iter().find(|p| p.is_match(text)) {
            Some(p) => Ok(SafetyVerdict::Unsafe {
                detail: format!("matched blocklist pattern '{}'", p.as_str()),
            }),
            None => Ok(SafetyVerdict::Safe),
        }
    }
}

/// Content classification through a Llama Guard model on Ollama.
///
/// The model answers `safe`, or `unsafe` followed by a line of violated
/// category codes (e.g. `S1,S10`).
pub struct LlamaGuardChecker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    policy: RetryPolicy,
}

impl LlamaGuardChecker {
    pub fn new(url: &str, model: &str, timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{}/api/chat", url.trim_end_matches('/')),
            model: model.to_string(),
            policy,
        })
    }
}

#[async_trait]
impl SafetyChecker for LlamaGuardChecker {
    fn name(&self) -> &str {
        "llama_guard"
    }

    async fn check(&self, text: &str, stage: CheckStage, prompt: &str) -> Result<SafetyVerdict> {
        let messages = match stage {
            CheckStage::Prompt => serde_json::json!([
                { "role": "user", "content": text }
            ]),
            CheckStage::Output => serde_json::json!([
                { "role": "user", "content": prompt },
                { "role": "assistant", "content": text }
            ]),
        };
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });

        let json = post_json_with_retry(
            &self.client,
            "llama-guard",
            &self.endpoint,
            None,
            &body,
            &self.policy,
        )
        .await?;

        let content = json
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| RagError::Provider {
                provider: "llama-guard".to_string(),
                message: "response has no message content".to_string(),
            })?;
        let verdict = parse_guard_verdict(content)?;
        debug!(%stage, safe = verdict == SafetyVerdict::Safe, "guard verdict");
        Ok(verdict)
    }
}

/// Parse a Llama Guard reply.
pub fn parse_guard_verdict(reply: &str) -> Result<SafetyVerdict> {
    let mut lines = reply.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next().unwrap_or_default().to_ascii_lowercase();
    match first.as_str() {
        "safe" => Ok(SafetyVerdict::Safe),
        "unsafe" => Ok(SafetyVerdict::Unsafe {
            detail: match lines.next() {
                Some(categories) => format!("unsafe categories: {}", categories),
                None => "unsafe".to_string(),
            },
        }),
        _ => Err(RagError::Provider {
            provider: "llama-guard".to_string(),
            message: format!("unexpected guard verdict: {:?}", reply),
        }),
    }
}

/// Instantiate the checkers listed in `[safety] checkers`, in order.
pub fn build_checkers(
    safety: &SafetyConfig,
    generator: &GeneratorConfig,
) -> Result<Vec<Box<dyn SafetyChecker>>> {
    let mut checkers: Vec<Box<dyn SafetyChecker>> = Vec::with_capacity(safety.checkers.len());
    for kind in &safety.checkers {
        match kind {
            CheckerKind::Blocklist => {
                checkers.push(Box::new(BlocklistChecker::new(&safety.blocklist)?));
            }
            CheckerKind::LlamaGuard => {
                let url = safety.guard_url.as_deref().unwrap_or(&generator.url);
                checkers.push(Box::new(LlamaGuardChecker::new(
                    url,
                    &safety.guard_model,
                    Duration::from_secs(generator.timeout_secs),
                    generator.retry_policy(),
                )?));
            }
        }
    }
    Ok(checkers)
}
