//! LLM providers and the resilience layer for ironloop.
//!
//! [`OpenAiCompatClient`] is the raw transport. [`ResilientClient`] wraps any
//! `LlmClient` with key rotation, transparent stream retry and a circuit
//! breaker; the agent only ever talks to the resilient wrapper.

pub mod circuit;
pub mod keys;
pub mod openai_compat;
pub mod resilient;

pub use circuit::{CircuitBreaker, CircuitState};
pub use keys::KeyRotator;
pub use openai_compat::OpenAiCompatClient;
pub use resilient::{ResilienceConfig, ResilientClient};
