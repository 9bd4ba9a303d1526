//! Model-call gateway abstraction and the OpenAI implementation.
//!
//! The pipeline depends on exactly two capabilities, both asynchronous and
//! both fallible:
//! - free-text generation ([`LlmClient::generate`])
//! - schema-constrained generation ([`LlmClient::generate_json`] plus the
//!   typed [`generate_structured`] wrapper)
//!
//! Concrete implementation: **[`OpenAiClient`]** — calls the chat completions
//! API with retry and backoff. Tests supply their own scripted client.
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retries live entirely at this boundary; the pipeline above treats every
//! gateway error as fatal to its unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::LlmConfig;

/// Gateway failure modes. Both abort the containing unit of work.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The call could not be completed (network, provider error, retries
    /// exhausted).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The model responded, but the response cannot be parsed into the
    /// expected structure.
    #[error("response did not match the expected schema: {0}")]
    Schema(String),
}

/// The two-operation capability the pipeline consumes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, for diagnostics.
    fn model_name(&self) -> &str;

    /// Generate free text from a prompt.
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>)
        -> Result<String, LlmError>;

    /// Generate a JSON value shaped by `schema_hint` (a prose description of
    /// the expected object, embedded in the system prompt).
    async fn generate_json(
        &self,
        prompt: &str,
        schema_hint: &str,
        system_prompt: Option<&str>,
    ) -> Result<Value, LlmError>;
}

/// Generate a value of a concrete type via the gateway.
///
/// Kept as a free function beside the object-safe trait: stage code holds
/// `Arc<dyn LlmClient>`, and the generic deserialization target cannot live
/// on a trait-object method. A JSON value that fails to deserialize into `T`
/// is reported as [`LlmError::Schema`].
pub async fn generate_structured<T: DeserializeOwned>(
    client: &dyn LlmClient,
    prompt: &str,
    schema_hint: &str,
    system_prompt: Option<&str>,
) -> Result<T, LlmError> {
    let value = client.generate_json(prompt, schema_hint, system_prompt).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema(e.to_string()))
}

// ============ OpenAI Client ============

/// Gateway implementation backed by the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. Structured calls set
/// `response_format = {"type": "json_object"}` and append the schema hint to
/// the system prompt.
pub struct OpenAiClient {
    model: String,
    temperature: f64,
    max_retries: u32,
    api_key: String,
    http: reqwest::Client,
}

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

impl OpenAiClient {
    /// Create a client for the given model.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set or the HTTP client
    /// cannot be built.
    pub fn new(config: &LlmConfig, model: String) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
            http,
        })
    }

    /// One chat completion with retry/backoff. Returns the assistant text.
    async fn chat(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(OPENAI_CHAT_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response
                            .json()
                            .await
                            .map_err(|e| LlmError::Generation(e.to_string()))?;
                        return extract_message_content(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(LlmError::Generation(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(LlmError::Generation(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(LlmError::Generation(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| LlmError::Generation("generation failed after retries".into())))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        self.chat(prompt, system_prompt, false).await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        schema_hint: &str,
        system_prompt: Option<&str>,
    ) -> Result<Value, LlmError> {
        let system = match system_prompt {
            Some(system) => format!(
                "{}\n\nRespond with a single JSON object of this shape:\n{}",
                system, schema_hint
            ),
            None => format!(
                "Respond with a single JSON object of this shape:\n{}",
                schema_hint
            ),
        };

        let text = self.chat(prompt, Some(&system), true).await?;
        let stripped = strip_code_fences(&text);
        serde_json::from_str(stripped).map_err(|e| LlmError::Schema(e.to_string()))
    }
}

/// Pull `choices[0].message.content` out of a chat completions response.
fn extract_message_content(json: &Value) -> Result<String, LlmError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::Generation("response missing message content".into()))
}

/// Strip a surrounding markdown code fence, if present. Some models wrap
/// JSON output in fences even in JSON mode.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

// ============ Client Registry ============

/// Pipeline stages that issue model calls, each independently overridable to
/// a different model via `[llm]` config.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    Reading,
    Codebook,
    Chunking,
    Coding,
}

/// Explicit per-run gateway registry.
///
/// Owned by the top-level run and passed down to the stages; one client is
/// built per distinct model name. This replaces ambient global client state
/// with constructor injection.
pub struct ClientRegistry {
    clients: HashMap<Stage, Arc<dyn LlmClient>>,
}

impl ClientRegistry {
    /// Build clients for all stages from configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut by_model: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
        let mut clients = HashMap::new();

        for stage in [Stage::Reading, Stage::Codebook, Stage::Chunking, Stage::Coding] {
            let model = stage_model(config, stage);
            let client = match by_model.get(&model) {
                Some(client) => Arc::clone(client),
                None => {
                    let client: Arc<dyn LlmClient> =
                        Arc::new(OpenAiClient::new(config, model.clone())?);
                    by_model.insert(model, Arc::clone(&client));
                    client
                }
            };
            clients.insert(stage, client);
        }

        Ok(Self { clients })
    }

    /// Route every stage to one client. Used by tests and single-model runs.
    pub fn single(client: Arc<dyn LlmClient>) -> Self {
        let mut clients = HashMap::new();
        for stage in [Stage::Reading, Stage::Codebook, Stage::Chunking, Stage::Coding] {
            clients.insert(stage, Arc::clone(&client));
        }
        Self { clients }
    }

    pub fn for_stage(&self, stage: Stage) -> Arc<dyn LlmClient> {
        Arc::clone(&self.clients[&stage])
    }
}

fn stage_model(config: &LlmConfig, stage: Stage) -> String {
    let override_model = match stage {
        Stage::Reading => &config.reading_model,
        Stage::Codebook => &config.codebook_model,
        Stage::Chunking => &config.chunking_model,
        Stage::Coding => &config.coding_model,
    };
    override_model.clone().unwrap_or_else(|| config.model.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences(r#"{"a": 1}"#), r#"{"a": 1}"#);
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_message_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        });
        assert_eq!(extract_message_content(&json).unwrap(), "hello");

        let bad = serde_json::json!({"choices": []});
        assert!(extract_message_content(&bad).is_err());
    }

    #[test]
    fn test_stage_model_overrides() {
        let config = LlmConfig {
            coding_model: Some("small-model".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(stage_model(&config, Stage::Coding), "small-model");
        assert_eq!(stage_model(&config, Stage::Reading), config.model);
    }
}
