//! File-based transcript store: append-only JSON lines.
//!
//! Each line is one JSON-encoded `TranscriptRecord`. A write is appended and
//! synced before `persist` returns, so a record that was reported persisted
//! survives a crash.
//!
//! Storage location: `~/.ironloop/transcripts.jsonl` by default.

use async_trait::async_trait;
use ironloop_core::error::MemoryError;
use ironloop_core::memory::{TranscriptRecord, TranscriptStore};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FileTranscript {
    path: PathBuf,
    /// Serialises appends from concurrent sessions
    write_lock: Mutex<()>,
}

impl FileTranscript {
    /// The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<TranscriptRecord>, MemoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read transcript file: {e}"
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<TranscriptRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted transcript line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl TranscriptStore for FileTranscript {
    async fn persist(&self, record: TranscriptRecord) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(&record)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create transcript directory: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open transcript file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write transcript: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to sync transcript: {e}")))?;

        debug!(
            path = %self.path.display(),
            conversation_id = %record.conversation_id,
            status = ?record.status,
            "Transcript persisted"
        );
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<TranscriptRecord>, MemoryError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect())
    }
}
