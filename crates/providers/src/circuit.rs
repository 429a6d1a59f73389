//! Circuit breaker over a sliding failure window.
//!
//! - Closed: calls pass through; failures are timestamped.
//! - Open: reached `threshold` failures inside `window`; calls fail fast
//!   without touching the network until the window has elapsed.

use ironloop_core::ProviderError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    threshold: usize,
    window: Duration,
    state: Mutex<Window>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, threshold: usize, window: Duration) -> Self {
        Self {
            provider: provider.into(),
            threshold: threshold.max(1),
            window,
            state: Mutex::new(Window::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail fast with `CircuitOpen` while the circuit is open.
    pub fn check(&self) -> Result<(), ProviderError> {
        let now = Instant::now();
        let mut state = self.lock();
        if let Some(opened_at) = state.opened_at {
            let elapsed = now.duration_since(opened_at);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                return Err(ProviderError::CircuitOpen {
                    provider: self.provider.clone(),
                    retry_in_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
                });
            }
            state.opened_at = None;
            state.failures.clear();
            info!(provider = %self.provider, "Circuit closed");
        }
        Ok(())
    }

    /// Record a failure. Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        state.prune(now, self.window);
        state.failures.push_back(now);

        if state.opened_at.is_none() && state.failures.len() >= self.threshold {
            state.opened_at = Some(now);
            warn!(
                provider = %self.provider,
                failures = state.failures.len(),
                window_secs = self.window.as_secs(),
                "Circuit opened"
            );
            return true;
        }
        false
    }

    /// A completed call clears the failure history.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.opened_at.is_none() {
            state.failures.clear();
        }
    }

    pub fn state(&self) -> CircuitState {
        let now = Instant::now();
        match self.lock().opened_at {
            Some(opened_at) if now.duration_since(opened_at) < self.window => CircuitState::Open,
            _ => CircuitState::Closed,
        }
    }

    /// Failures currently inside the window.
    pub fn failure_count(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        state.prune(now, self.window);
        state.failures.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}
