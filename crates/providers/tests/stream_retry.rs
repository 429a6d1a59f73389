//! Stream retry through the public API: whatever fragment a rate limit
//! interrupts, the caller sees the uninterrupted text exactly once.

use async_trait::async_trait;
use ironloop_core::{
    ChunkReceiver, CollectingSink, LlmClient, LlmRequest, Message, ProviderError, StreamChunk,
};
use ironloop_providers::{CircuitBreaker, KeyRotator, ResilientClient};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const RESPONSE: &[&str] = &["§think ", "the user wants ", "a sum §", "respond ", "2 + 2 = 4 §end"];

/// Fails the first attempt with a rate limit after `fail_after` fragments,
/// then serves the full response.
struct FlakyClient {
    fail_after: usize,
    attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmClient for FlakyClient {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn stream(
        &self,
        _request: LlmRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, ProviderError> {
        let first = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(api_key.to_string());
            attempts.len() == 1
        };

        let (tx, rx) = mpsc::channel(RESPONSE.len() + 2);
        if first {
            for fragment in &RESPONSE[..self.fail_after] {
                tx.try_send(Ok(StreamChunk::text(*fragment))).unwrap();
            }
            tx.try_send(Err(ProviderError::RateLimited { retry_after_secs: 1 }))
                .unwrap();
        } else {
            for fragment in RESPONSE {
                tx.try_send(Ok(StreamChunk::text(*fragment))).unwrap();
            }
            tx.try_send(Ok(StreamChunk::done())).unwrap();
        }
        Ok(rx)
    }
}

fn resilient(client: Arc<FlakyClient>, sink: Arc<CollectingSink>) -> ResilientClient {
    ResilientClient::new(
        client,
        Arc::new(KeyRotator::in_order(vec![
            "sk-first-1111".into(),
            "sk-second-2222".into(),
        ])),
        Arc::new(CircuitBreaker::new("flaky", 5, Duration::from_secs(60))),
        sink,
    )
}

#[tokio::test]
async fn retry_is_invisible_at_every_failure_point() {
    let expected = RESPONSE.concat();

    for fail_after in 0..RESPONSE.len() {
        let client = Arc::new(FlakyClient {
            fail_after,
            attempts: Mutex::new(Vec::new()),
        });
        let sink = Arc::new(CollectingSink::new());
        let rc = resilient(client.clone(), sink.clone());

        let text = rc
            .generate(LlmRequest::new("m", vec![Message::user("what is 2 + 2")]))
            .await
            .unwrap();

        assert_eq!(text, expected, "fail_after = {fail_after}");
        assert_eq!(
            *client.attempts.lock().unwrap(),
            vec!["sk-first-1111", "sk-second-2222"]
        );
        assert_eq!(sink.of_kind("key_rotated").len(), 1);
        assert_eq!(rc.circuit().failure_count(), 0);
    }
}

#[tokio::test]
async fn rotation_message_names_next_key_suffix() {
    let client = Arc::new(FlakyClient {
        fail_after: 2,
        attempts: Mutex::new(Vec::new()),
    });
    let sink = Arc::new(CollectingSink::new());
    let rc = resilient(client, sink.clone());
    rc.generate(LlmRequest::new("m", vec![])).await.unwrap();

    let rotated = sink.of_kind("key_rotated");
    let json = serde_json::to_value(&rotated[0]).unwrap();
    assert_eq!(json["message"], "rotating to key ending in ...2222");
    assert_eq!(json["provider"], "flaky");
}
