//! Generator implementations.
//!
//! | `[generator] provider` | Generator | Gated |
//! |------------------------|-----------|-------|
//! | `openai` | [`OpenAiGenerator`] (`POST {base_url}/chat/completions`) | only with `safety.guard_remote` |
//! | `local` | [`OllamaGenerator`] (`POST {url}/api/generate`) | always |
//!
//! Gating wraps the generator in
//! [`GuardedGenerator`] with the checkers from
//! `[safety] checkers`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragtrace_core::generation::{Generation, Generator, GuardedGenerator};
use ragtrace_core::{RagError, Result};
use tracing::debug;

use crate::config::{resolve_api_key, Config, GeneratorBackend, GeneratorConfig};
use crate::http::{build_client, post_json_with_retry, RetryPolicy};
use crate::safety::build_checkers;

/// Chat-completions generator for OpenAI-compatible APIs.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    name: String,
    temperature: f32,
    top_p: f32,
    policy: RetryPolicy,
}

impl OpenAiGenerator {
    /// # Errors
    ///
    /// [`RagError::Config`] if no API key is available.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let model = config.model_name();
        let api_key = resolve_api_key(&config.api_key).ok_or_else(|| {
            RagError::config("no API key: set generator.api_key or OPENAI_API_KEY")
        })?;
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            name: format!("openai:{}", model),
            model,
            temperature: config.temperature,
            top_p: config.top_p,
            policy: config.retry_policy(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "top_p": self.top_p,
        });
        let json = post_json_with_retry(
            &self.client,
            "openai-chat",
            &self.endpoint,
            Some(&self.api_key),
            &body,
            &self.policy,
        )
        .await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| RagError::Provider {
                provider: "openai-chat".to_string(),
                message: "response has no choices[0].message.content".to_string(),
            })?;
        debug!(generator = %self.name, chars = text.len(), "generated answer");
        Ok(Generation::Allowed(text.trim().to_string()))
    }
}

/// Local inference through Ollama's generate API.
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    name: String,
    options: serde_json::Value,
    policy: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let model = config.model_name();
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: format!("{}/api/generate", config.url.trim_end_matches('/')),
            name: format!("ollama:{}", model),
            model,
            options: serde_json::json!({
                "temperature": config.temperature,
                "top_p": config.top_p,
                "top_k": config.top_k,
                "num_predict": config.max_new_tokens,
                "seed": config.seed,
                "repeat_penalty": config.repetition_penalty,
            }),
            policy: config.retry_policy(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": self.options,
        });
        let json = post_json_with_retry(
            &self.client,
            "ollama",
            &self.endpoint,
            None,
            &body,
            &self.policy,
        )
        .await?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| RagError::Provider {
                provider: "ollama".to_string(),
                message: "response has no 'response' field".to_string(),
            })?;
        debug!(generator = %self.name, chars = text.len(), "generated answer");
        Ok(Generation::Allowed(text.trim().to_string()))
    }
}

/// Instantiate the generator selected by `[generator] provider`.
pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    match config.generator.provider {
        GeneratorBackend::OpenAi => {
            let generator = OpenAiGenerator::new(&config.generator)?;
            if config.safety.guard_remote {
                let checkers = build_checkers(&config.safety, &config.generator)?;
                Ok(Arc::new(GuardedGenerator::new(generator, checkers)))
            } else {
                Ok(Arc::new(generator))
            }
        }
        GeneratorBackend::Local => {
            let checkers = build_checkers(&config.safety, &config.generator)?;
            if checkers.is_empty() {
                return Err(RagError::config(
                    "the local generator requires at least one safety checker",
                ));
            }
            let generator = OllamaGenerator::new(&config.generator)?;
            Ok(Arc::new(GuardedGenerator::new(generator, checkers)))
        }
    }
}
