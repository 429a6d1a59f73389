//! OpenAI-compatible streaming client.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` with SSE streaming.
//!
//! The key is supplied per request so the resilience layer above can rotate
//! it. HTTP statuses are mapped to typed [`ProviderError`]s; this client never
//! retries on its own.

use async_trait::async_trait;
use futures::StreamExt;
use ironloop_config::ProviderSettings;
use ironloop_core::error::ProviderError;
use ironloop_core::message::{Message, Role};
use ironloop_core::provider::{ChunkReceiver, LlmClient, LlmRequest, StreamChunk};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Fallback when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// OpenRouter (convenience constructor).
    pub fn openrouter() -> Result<Self, ProviderError> {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            Duration::from_secs(60),
        )
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Self::new(
            settings.name.clone(),
            settings.base_url.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User | Role::Tool => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

/// Map a non-success HTTP status to a typed error.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        402 => ProviderError::QuotaExhausted { message: body },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// What one SSE `data:` line means for the stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Text(String),
    Done,
    Failed(ProviderError),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            if let Some(error) = resp.error {
                return SseLine::Failed(error.into_provider_error());
            }
            let text: String = resp
                .choices
                .iter()
                .filter_map(|c| c.delta.content.as_deref())
                .collect();
            if text.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Text(text)
            }
        }
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: LlmRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, "Provider streaming error");
            return Err(status_error(status, retry_after, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            // Raw bytes: a multi-byte character may straddle two network chunks
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    match parse_sse_line(line) {
                        SseLine::Text(text) => {
                            if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => {
                            let _ = tx.send(Ok(StreamChunk::done())).await;
                            return;
                        }
                        SseLine::Failed(e) => {
                            warn!(provider = %provider_name, error = %e, "Error event in stream");
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: String,
}

impl StreamError {
    fn into_provider_error(self) -> ProviderError {
        let code = match &self.code {
            Some(serde_json::Value::Number(n)) => n.as_u64().map(|c| c.to_string()),
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        match code.as_deref() {
            Some("429") | Some("rate_limit_exceeded") => ProviderError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            },
            Some("402") | Some("insufficient_quota") => ProviderError::QuotaExhausted {
                message: self.message,
            },
            _ => ProviderError::StreamInterrupted(self.message),
        }
    }
}
