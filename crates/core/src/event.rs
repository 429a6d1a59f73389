//! Observability sink: structured records emitted at well-defined boundaries.
//!
//! There is no process-wide bus. A sink handle is constructed once at startup
//! and passed explicitly to every component that reports something.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Per-round measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricStep {
    pub iteration: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub tool_calls: u32,
    pub duration_ms: u64,
}

/// Running totals for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTotal {
    pub iterations: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub tool_calls: u32,
    pub duration_ms: u64,
}

impl MetricTotal {
    /// Fold one round into the totals.
    pub fn add(&mut self, step: &MetricStep) {
        self.iterations = step.iteration;
        self.prompt_tokens += step.prompt_tokens;
        self.completion_tokens += step.completion_tokens;
        self.tool_calls += step.tool_calls;
        self.duration_ms += step.duration_ms;
    }
}

/// Every structured record the core emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservabilityRecord {
    Metric {
        step: MetricStep,
        total: MetricTotal,
    },
    RoundStarted {
        conversation_id: String,
        iteration: u32,
    },
    RoundFinished {
        conversation_id: String,
        iteration: u32,
        outcome: String,
    },
    ToolStarted {
        task_id: String,
        tool: String,
    },
    ToolFinished {
        task_id: String,
        tool: String,
        error: bool,
        duration_ms: u64,
    },
    KeyRotated {
        provider: String,
        message: String,
    },
    CircuitOpened {
        provider: String,
        failures: usize,
    },
}

impl ObservabilityRecord {
    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Metric { .. } => "metric",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundFinished { .. } => "round_finished",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::KeyRotated { .. } => "key_rotated",
            Self::CircuitOpened { .. } => "circuit_opened",
        }
    }
}

/// Where records go.
pub trait EventSink: Send + Sync {
    fn emit(&self, record: &ObservabilityRecord);

    /// Flush buffered records. Called once at shutdown.
    fn flush(&self) {}
}

/// Logs each record through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, record: &ObservabilityRecord) {
        match serde_json::to_string(record) {
            Ok(json) => tracing::info!(target: "ironloop::events", kind = record.kind(), record = %json),
            Err(e) => tracing::warn!(kind = record.kind(), error = %e, "Unserializable record"),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<ObservabilityRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ObservabilityRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records with the given `type` tag.
    pub fn of_kind(&self, kind: &str) -> Vec<ObservabilityRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.kind() == kind)
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, record: &ObservabilityRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Forwards each record to several sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, record: &ObservabilityRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _record: &ObservabilityRecord) {}
}
