//! OpenAI-compatible structured extraction client.
//!
//! Calls `POST {base_url}/chat/completions` with a strict `json_schema`
//! response format built from [`ExtractedRecord`]. Works against any server
//! that speaks the OpenAI chat completions dialect.
//!
//! Retry strategy within one [`LlmClient::extract`] call:
//! - malformed output: re-prompt with the parse error, no delay
//! - HTTP 429 or 5xx: retry with exponential backoff
//! - network error: retry with exponential backoff
//! - other HTTP 4xx: fail immediately

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::models::ExtractedRecord;
use crate::provider::{LlmClient, LlmError};
use crate::schema::{record_schema, RECORD_SCHEMA_NAME};

const EXTRACTION_PROMPT: &str =
    "You are a financial news extraction expert. Extract the requested fields from the following article:";

pub struct OpenAiClient {
    name: String,
    model: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    schema: Value,
}

impl OpenAiClient {
    pub fn new(
        name: &str,
        model: &str,
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
            schema: record_schema(),
        })
    }

    /// Build from a `[[providers]]` entry, reading the key from `api_key_env`.
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            &config.name,
            &config.model,
            &config.base_url,
            &api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn provider_name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn complete(&self, messages: &[Value]) -> Result<Value, LlmError> {
        let body = request_body(&self.model, messages, &self.schema);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| LlmError::Request(e.to_string()));
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(LlmError::Status {
            status: status.as_u16(),
            body: body_text,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, text: &str, max_retries: u32) -> Result<ExtractedRecord, LlmError> {
        let mut messages = vec![user_message(text)];
        let mut last_err: Option<LlmError> = None;
        let mut backoff_step = 0u32;

        for attempt in 0..=max_retries {
            if backoff_step > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (backoff_step - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let err = match self.complete(&messages).await {
                Ok(json) => match parse_completion(&json) {
                    Ok(record) => return Ok(record.dedup_links()),
                    Err(LlmError::Malformed(reason)) => {
                        backoff_step = 0;
                        if let Some(content) = completion_content(&json) {
                            messages.push(json!({ "role": "assistant", "content": content }));
                        }
                        messages.push(correction_message(&reason));
                        LlmError::Malformed(reason)
                    }
                    Err(other) => return Err(other),
                },
                Err(e) if is_retryable(&e) => {
                    backoff_step += 1;
                    e
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(
                model = %self.model,
                attempt = attempt + 1,
                error = %err,
                "structured extraction attempt failed"
            );
            last_err = Some(err);
        }

        Err(LlmError::RetriesExhausted {
            attempts: max_retries + 1,
            last: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::Request(_) => true,
        LlmError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn user_message(text: &str) -> Value {
    json!({
        "role": "user",
        "content": format!("{}\n\n{}", EXTRACTION_PROMPT, text),
    })
}

fn correction_message(reason: &str) -> Value {
    json!({
        "role": "user",
        "content": format!(
            "The previous answer did not match the required schema: {}. Answer again with valid JSON only.",
            reason
        ),
    })
}

fn request_body(model: &str, messages: &[Value], schema: &Value) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": RECORD_SCHEMA_NAME,
                "strict": true,
                "schema": schema,
            }
        }
    })
}

fn completion_content(json: &Value) -> Option<&str> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

/// Parse a chat completion response into an [`ExtractedRecord`].
fn parse_completion(json: &Value) -> Result<ExtractedRecord, LlmError> {
    if let Some(refusal) = json
        .pointer("/choices/0/message/refusal")
        .and_then(Value::as_str)
    {
        return Err(LlmError::Malformed(format!("model refused: {}", refusal)));
    }

    let content = completion_content(json)
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".to_string()))?;

    serde_json::from_str(content).map_err(|e| LlmError::Malformed(e.to_string()))
}
