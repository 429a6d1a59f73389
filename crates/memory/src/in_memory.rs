//! In-memory collaborators: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use ironloop_core::error::MemoryError;
use ironloop_core::memory::{ActionRecord, TranscriptRecord, TranscriptStore, WorkingMemoryStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A transcript store that keeps records in a Vec, with the instant each
/// write completed.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTranscript {
    records: Arc<RwLock<Vec<(TranscriptRecord, Instant)>>>,
}

impl InMemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every persisted record, oldest first.
    pub async fn records(&self) -> Vec<TranscriptRecord> {
        self.records
            .read()
            .await
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// When each record's write completed.
    pub async fn persisted_at(&self) -> Vec<Instant> {
        self.records.read().await.iter().map(|(_, t)| *t).collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscript {
    async fn persist(&self, record: TranscriptRecord) -> Result<(), MemoryError> {
        self.records.write().await.push((record, Instant::now()));
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<TranscriptRecord>, MemoryError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|(r, _)| r.conversation_id == conversation_id)
            .map(|(r, _)| r.clone())
            .collect())
    }
}

/// Task-scoped action log held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWorkingMemory {
    actions: Arc<RwLock<HashMap<String, Vec<ActionRecord>>>>,
}

impl InMemoryWorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks with at least one action.
    pub async fn task_count(&self) -> usize {
        self.actions.read().await.len()
    }
}

#[async_trait]
impl WorkingMemoryStore for InMemoryWorkingMemory {
    async fn record_action(&self, task_id: &str, action: ActionRecord) -> Result<(), MemoryError> {
        self.actions
            .write()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push(action);
        Ok(())
    }

    async fn actions(&self, task_id: &str) -> Result<Vec<ActionRecord>, MemoryError> {
        Ok(self
            .actions
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default())
    }
}
