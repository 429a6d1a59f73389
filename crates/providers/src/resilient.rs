//! Resilient streaming over a raw [`LlmClient`].
//!
//! Wraps one provider with key rotation, rate-limit-aware stream retry and a
//! circuit breaker. Callers see a single text-fragment stream; reissued
//! attempts underneath are invisible to them.

use ironloop_config::AppConfig;
use ironloop_core::{
    ChunkReceiver, EventSink, FragmentReceiver, LlmClient, LlmRequest, ObservabilityRecord,
    ProviderError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::circuit::CircuitBreaker;
use crate::keys::{KeyRotator, suffix};

/// Knobs for one resilient client.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Deadline for opening a stream, and for the gap between two chunks
    pub request_timeout: Duration,
    /// Reissues allowed per call, on top of the key-pool bound
    pub max_stream_retries: u32,
    pub channel_capacity: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_stream_retries: 3,
            channel_capacity: 64,
        }
    }
}

impl ResilienceConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.provider.request_timeout_secs),
            max_stream_retries: config.resilience.max_stream_retries,
            channel_capacity: config.agent.channel_capacity,
        }
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug, Default)]
struct Attempts {
    tried: Vec<String>,
    reissues: u32,
}

/// Position in already-delivered text while a reissued stream catches up.
#[derive(Debug)]
struct Replay {
    /// Byte offset into the delivered text
    pos: usize,
    /// Delivered characters the new stream still has to reproduce
    remaining: usize,
    diverged: bool,
}

#[derive(Clone)]
pub struct ResilientClient {
    client: Arc<dyn LlmClient>,
    keys: Arc<KeyRotator>,
    circuit: Arc<CircuitBreaker>,
    sink: Arc<dyn EventSink>,
    config: ResilienceConfig,
}

impl ResilientClient {
    pub fn new(
        client: Arc<dyn LlmClient>,
        keys: Arc<KeyRotator>,
        circuit: Arc<CircuitBreaker>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            keys,
            circuit,
            sink,
            config: ResilienceConfig::default(),
        }
    }

    /// Wire a client from application config: shuffled key pool, circuit
    /// thresholds and timeouts all come from `config`.
    pub fn from_config(
        config: &AppConfig,
        keys: Vec<String>,
        client: Arc<dyn LlmClient>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let circuit = CircuitBreaker::new(
            client.name().to_string(),
            config.resilience.failure_threshold,
            Duration::from_secs(config.resilience.window_secs),
        );
        Self::new(client, Arc::new(KeyRotator::new(keys)), Arc::new(circuit), sink)
            .with_config(ResilienceConfig::from_app_config(config))
    }

    pub fn with_config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    pub fn keys(&self) -> &KeyRotator {
        &self.keys
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    /// Stream text fragments for `request`.
    ///
    /// Errors opening the first attempt are returned directly. Anything that
    /// goes wrong later arrives as the last item on the returned channel, after
    /// every fragment that was already delivered.
    pub async fn stream(&self, request: LlmRequest) -> Result<FragmentReceiver, ProviderError> {
        let mut attempts = Attempts::default();
        let (key, upstream) = self.open(&request, &mut attempts).await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let this = self.clone();
        tokio::spawn(async move {
            this.pump(request, key, upstream, attempts, tx).await;
        });
        Ok(rx)
    }

    /// One-shot generation with the same rotation and retry rules.
    pub async fn generate(&self, request: LlmRequest) -> Result<String, ProviderError> {
        let mut rx = self.stream(request).await?;
        let mut out = String::new();
        while let Some(fragment) = rx.recv().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }

    /// Open a stream with the current key, rotating past rate-limited and
    /// exhausted keys.
    async fn open(
        &self,
        request: &LlmRequest,
        attempts: &mut Attempts,
    ) -> Result<(String, ChunkReceiver), ProviderError> {
        loop {
            self.circuit.check()?;
            let key = self.keys.current().ok_or_else(no_backup_keys)?;
            if !attempts.tried.contains(&key) {
                attempts.tried.push(key.clone());
            }

            debug!(
                provider = %self.provider_name(),
                key = %suffix(&key),
                "Opening stream"
            );
            let opened = tokio::time::timeout(
                self.config.request_timeout,
                self.client.stream(request.clone(), &key),
            )
            .await;

            match opened {
                Ok(Ok(upstream)) => return Ok((key, upstream)),
                Ok(Err(e)) => self.recover(e, &key, attempts)?,
                Err(_) => {
                    let e = ProviderError::Timeout(format!(
                        "no response from {} within {}s",
                        self.provider_name(),
                        self.config.request_timeout.as_secs()
                    ));
                    return Err(self.fail(e));
                }
            }
        }
    }

    /// Decide whether `err` can be retried on another key.
    ///
    /// `Ok(())` means a fresh key is active and the caller should reissue.
    fn recover(
        &self,
        err: ProviderError,
        key: &str,
        attempts: &mut Attempts,
    ) -> Result<(), ProviderError> {
        let quota = err.is_quota_exhausted();
        if !quota && !err.is_rate_limit() {
            return Err(self.fail(err));
        }

        if quota {
            warn!(
                provider = %self.provider_name(),
                key = %suffix(key),
                "Key quota exhausted, removing from pool"
            );
            self.keys.remove(key);
        } else {
            warn!(
                provider = %self.provider_name(),
                key = %suffix(key),
                error = %err,
                "Rate limited"
            );
        }

        if attempts.reissues >= self.config.max_stream_retries {
            return Err(self.fail(no_backup_keys()));
        }
        attempts.reissues += 1;

        let message = if quota {
            self.keys
                .current()
                .map(|next| format!("rotating to key ending in {}", suffix(&next)))
        } else {
            self.keys.rotate_past(key)
        };
        let next = self.keys.current();
        let (Some(message), Some(next)) = (message, next) else {
            return Err(self.fail(no_backup_keys()));
        };
        if attempts.tried.contains(&next) {
            return Err(self.fail(no_backup_keys()));
        }

        info!(provider = %self.provider_name(), "{message}");
        self.sink.emit(&ObservabilityRecord::KeyRotated {
            provider: self.provider_name().to_string(),
            message,
        });
        Ok(())
    }

    /// Count a failure against the circuit and hand the error back.
    fn fail(&self, err: ProviderError) -> ProviderError {
        if self.circuit.record_failure() {
            self.sink.emit(&ObservabilityRecord::CircuitOpened {
                provider: self.provider_name().to_string(),
                failures: self.circuit.failure_count(),
            });
        }
        err
    }

    async fn pump(
        self,
        request: LlmRequest,
        mut key: String,
        mut upstream: ChunkReceiver,
        mut attempts: Attempts,
        tx: mpsc::Sender<Result<String, ProviderError>>,
    ) {
        let mut delivered = String::new();
        let mut replay: Option<Replay> = None;

        loop {
            let next = match tokio::time::timeout(self.config.request_timeout, upstream.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    let e = ProviderError::Timeout(format!(
                        "stream from {} stalled for {}s",
                        self.provider_name(),
                        self.config.request_timeout.as_secs()
                    ));
                    let _ = tx.send(Err(self.fail(e))).await;
                    return;
                }
            };

            let failure = match next {
                None => {
                    self.circuit.record_success();
                    return;
                }
                Some(Ok(chunk)) => {
                    match chunk.content {
                        Some(text) => {
                            let fresh = match replay.as_mut() {
                                Some(cursor) => catch_up(&delivered, cursor, &text),
                                None => text.as_str(),
                            };
                            if replay.as_ref().is_some_and(|c| c.remaining == 0) {
                                replay = None;
                            }
                            if !fresh.is_empty() {
                                let fresh = fresh.to_string();
                                delivered.push_str(&fresh);
                                if tx.send(Ok(fresh)).await.is_err() {
                                    debug!("Fragment receiver dropped, abandoning stream");
                                    return;
                                }
                            }
                        }
                        None if !chunk.done => {
                            let _ = tx
                                .send(Err(ProviderError::NonTextChunk(format!(
                                    "{} sent a chunk without text",
                                    self.provider_name()
                                ))))
                                .await;
                            return;
                        }
                        None => {}
                    }
                    if chunk.done {
                        self.circuit.record_success();
                        return;
                    }
                    continue;
                }
                Some(Err(e)) => e,
            };

            if let Err(e) = self.recover(failure, &key, &mut attempts) {
                let _ = tx.send(Err(e)).await;
                return;
            }
            match self.open(&request, &mut attempts).await {
                Ok((new_key, new_upstream)) => {
                    info!(
                        provider = %self.provider_name(),
                        replay_chars = delivered.chars().count(),
                        "Reissued stream, replaying delivered prefix"
                    );
                    key = new_key;
                    upstream = new_upstream;
                    replay = (!delivered.is_empty()).then(|| Replay {
                        pos: 0,
                        remaining: delivered.chars().count(),
                        diverged: false,
                    });
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}

/// Consume the part of `text` that re-covers already-delivered output and
/// return what is new. On divergence the new stream is aligned by length.
fn catch_up<'a>(delivered: &str, cursor: &mut Replay, text: &'a str) -> &'a str {
    for (idx, ch) in text.char_indices() {
        if cursor.remaining == 0 {
            return &text[idx..];
        }
        if let Some(expected) = delivered[cursor.pos..].chars().next() {
            if expected != ch && !cursor.diverged {
                cursor.diverged = true;
                warn!(
                    at_char = delivered[..cursor.pos].chars().count(),
                    "Reissued stream diverged from delivered text"
                );
            }
            cursor.pos += expected.len_utf8();
        }
        cursor.remaining -= 1;
    }
    ""
}

fn no_backup_keys() -> ProviderError {
    ProviderError::KeyRotation {
        message: "no backup keys available".into(),
    }
}
