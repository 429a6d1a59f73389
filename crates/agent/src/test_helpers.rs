//! Scripted model clients for controller tests.
//!
//! Public so integration tests and downstream crates can drive a
//! [`ReactController`](crate::ReactController) without a network.

use async_trait::async_trait;
use ironloop_core::{
    ChunkReceiver, EventSink, LlmClient, LlmRequest, ProviderError, StreamChunk,
};
use ironloop_providers::{CircuitBreaker, KeyRotator, ResilientClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    /// Stream these fragments, then finish.
    Reply(Vec<String>),
    /// Stream these fragments, then fail mid-stream.
    Interrupted(Vec<String>, ProviderError),
    /// Fail before any fragment.
    Fails(ProviderError),
    /// Stream these fragments, then stall without finishing.
    Stalls(Vec<String>),
}

impl Step {
    /// A reply delivered as a single fragment.
    pub fn text(reply: &str) -> Self {
        Self::Reply(vec![reply.to_string()])
    }

    /// A reply split into `size`-character fragments.
    pub fn chunked(reply: &str, size: usize) -> Self {
        let chars: Vec<char> = reply.chars().collect();
        Self::Reply(
            chars
                .chunks(size.max(1))
                .map(|c| c.iter().collect())
                .collect(),
        )
    }
}

/// Replays a fixed list of steps, one per `stream` call.
///
/// Running out of steps returns `NotConfigured`, which ends the run as a
/// provider failure rather than panicking inside a spawned task.
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: LlmRequest,
        _api_key: &str,
    ) -> Result<ChunkReceiver, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let (fragments, tail) = match step {
            None => {
                return Err(ProviderError::NotConfigured("script exhausted".into()));
            }
            Some(Step::Fails(e)) => return Err(e),
            Some(Step::Reply(f)) => (f, Some(Ok(StreamChunk::done()))),
            Some(Step::Interrupted(f, e)) => (f, Some(Err(e))),
            Some(Step::Stalls(f)) => (f, None),
        };

        let (tx, rx) = mpsc::channel(fragments.len() + 2);
        tokio::spawn(async move {
            for fragment in fragments {
                if tx.send(Ok(StreamChunk::text(fragment))).await.is_err() {
                    return;
                }
            }
            match tail {
                Some(last) => {
                    let _ = tx.send(last).await;
                }
                None => {
                    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                    drop(tx);
                }
            }
        });
        Ok(rx)
    }
}

/// Wrap `client` with resilience over the given keys, tried in order.
pub fn resilient(
    client: Arc<dyn LlmClient>,
    keys: &[&str],
    sink: Arc<dyn EventSink>,
) -> ResilientClient {
    let circuit = CircuitBreaker::new(client.name().to_string(), 5, Duration::from_secs(60));
    let keys = KeyRotator::in_order(keys.iter().map(|k| k.to_string()).collect());
    ResilientClient::new(client, Arc::new(keys), Arc::new(circuit), sink)
}
