//! Messages-API client for the text-generation endpoint

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::traits::{ModelError, TextGenerator};
use crate::config::ModelConfig;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_version: String,
    api_key: Option<String>,
    max_tokens: u32,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentSegment>,
}

/// One typed segment of the reply; only `text` segments carry prose
#[derive(Debug, Deserialize)]
struct ContentSegment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(cfg: &ModelConfig, api_key: Option<String>) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ModelError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_version: cfg.api_version.clone(),
            api_key,
            max_tokens: cfg.max_tokens,
            timeout_ms: cfg.timeout_ms,
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ModelError::Network {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: truncate_snippet(body_text.trim(), 500),
            });
        }

        let parsed: MessagesResponse = resp.json().await.map_err(|e| ModelError::Decode {
            message: e.to_string(),
        })?;
        let text = concat_text(&parsed.content);

        debug!(
            "{} replied in {}ms: {} segments, {} chars (prompt {} chars)",
            self.model,
            started.elapsed().as_millis(),
            parsed.content.len(),
            text.len(),
            prompt.len()
        );
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Concatenate the text segments in order, skipping every other segment type
fn concat_text(segments: &[ContentSegment]) -> String {
    segments
        .iter()
        .filter(|s| s.kind == "text")
        .filter_map(|s| s.text.as_deref())
        .collect()
}

fn truncate_snippet(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push('…');
    out
}
