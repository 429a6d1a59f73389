//! LLM client trait: the single abstract capability the core depends on.
//!
//! A client knows how to send a message list to a model with a given API key
//! and hand back a stream of text chunks, or a one-shot completion.
//! Key selection, retry and circuit breaking live above this trait, in the
//! providers crate's resilience layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// A single chunk of a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: None,
            done: true,
        }
    }
}

/// Receiving half of a chunk stream.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// Receiving half of a plain text fragment stream, as consumed by the protocol parser.
pub type FragmentReceiver = mpsc::Receiver<Result<String, ProviderError>>;

/// The raw model capability.
///
/// Implementations must not retry or rotate keys themselves; they report
/// rate limits and quota exhaustion as typed [`ProviderError`]s.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    async fn stream(
        &self,
        request: LlmRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, ProviderError>;

    /// One-shot generation.
    ///
    /// Default implementation drains `stream()` and concatenates the text.
    async fn generate(&self, request: LlmRequest, api_key: &str) -> Result<String, ProviderError> {
        let mut rx = self.stream(request, api_key).await?;
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content {
                out.push_str(&text);
            }
            if chunk.done {
                break;
            }
        }
        Ok(out)
    }
}
