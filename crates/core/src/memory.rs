//! Collaborator traits for conversation transcripts and working memory.
//!
//! The controller only needs two narrow capabilities from storage: write a
//! transcript record once a query reaches a terminal state, and append an
//! action record for every tool invocation. Implementations live in the
//! memory crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemoryError;
use crate::tool::ToolResult;

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Completed,
    Failed,
    Cancelled,
}

/// One durable transcript entry, written exactly once per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub user_id: String,
    pub conversation_id: String,
    pub query: String,
    pub response: String,
    pub status: TranscriptStatus,
    pub recorded_at: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
        status: TranscriptStatus,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            query: query.into(),
            response: response.into(),
            status,
            recorded_at: Utc::now(),
        }
    }
}

/// Durable transcript writes.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist a record. Must not return until the write is durable.
    async fn persist(&self, record: TranscriptRecord) -> Result<(), MemoryError>;

    /// Records for one conversation, oldest first.
    async fn history(&self, conversation_id: &str) -> Result<Vec<TranscriptRecord>, MemoryError>;
}

/// One tool invocation as seen by working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool: String,
    pub args: Map<String, Value>,
    pub result: ToolResult,
    pub recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>, result: ToolResult) -> Self {
        Self {
            tool: tool.into(),
            args,
            result,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only, task-scoped action log.
#[async_trait]
pub trait WorkingMemoryStore: Send + Sync {
    async fn record_action(&self, task_id: &str, action: ActionRecord) -> Result<(), MemoryError>;

    /// All actions for a task, in the order they were recorded.
    async fn actions(&self, task_id: &str) -> Result<Vec<ActionRecord>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_record_serializes_status() {
        let record = TranscriptRecord::new("u1", "c1", "q", "a", TranscriptStatus::Cancelled);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["user_id"], "u1");
    }

    #[test]
    fn action_record_round_trips() {
        let mut args = Map::new();
        args.insert("expression".into(), Value::from("1+1"));
        let action = ActionRecord::new("calculator", args, ToolResult::ok("calculated", "2"));
        let json = serde_json::to_string(&action).unwrap();
        let back: ActionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
