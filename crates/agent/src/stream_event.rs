//! Agent-level streaming events.
//!
//! `AgentEvent` is what a caller of [`ReactController::run`](crate::ReactController::run)
//! reads from its channel. Protocol events are forwarded as they are parsed;
//! exactly one terminal event (`done`, `failed` or `cancelled`) ends the
//! stream, and it is only sent after the transcript has been persisted.

use ironloop_core::{MetricStep, MetricTotal, ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Reasoning text, streamed as it arrives.
    Think { content: String },

    /// Tool calls parsed from a `calls` section, about to be dispatched.
    Calls { calls: Vec<ToolCall> },

    /// One dispatched call finished.
    ToolResult { name: String, result: ToolResult },

    /// User-facing answer text, streamed as it arrives.
    Respond { content: String },

    /// A recoverable protocol problem (e.g. a malformed `calls` section).
    Error { content: String },

    /// Per-round measurements and running totals.
    Metric { step: MetricStep, total: MetricTotal },

    /// The run finished with an answer.
    Done {
        answer: String,
        iterations: u32,
        tool_calls_made: u32,
    },

    /// The run failed; `partial_answer` is the last answer text seen, if any.
    Failed {
        kind: FailureKind,
        message: String,
        partial_answer: Option<String>,
    },

    /// The caller cancelled the run.
    Cancelled { message: String },
}

impl AgentEvent {
    /// The serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Think { .. } => "think",
            Self::Calls { .. } => "calls",
            Self::ToolResult { .. } => "tool_result",
            Self::Respond { .. } => "respond",
            Self::Error { .. } => "error",
            Self::Metric { .. } => "metric",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}
