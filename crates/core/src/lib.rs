//! # ironloop core
//!
//! Domain types, traits, and error definitions for the ironloop agent core.
//! Every subsystem the controller talks to is a trait here; implementations
//! live in their own crates and depend inward on this one.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, SecurityError, ToolError};
pub use event::{
    CollectingSink, EventSink, FanoutSink, MetricStep, MetricTotal, NullSink, ObservabilityRecord,
    TracingSink,
};
pub use memory::{
    ActionRecord, TranscriptRecord, TranscriptStatus, TranscriptStore, WorkingMemoryStore,
};
pub use message::{ConversationId, Message, Role};
pub use provider::{ChunkReceiver, FragmentReceiver, LlmClient, LlmRequest, StreamChunk};
pub use tool::{
    FieldKind, FieldSpec, Tool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult, ToolSchema,
};
