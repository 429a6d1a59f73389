//! Transcript store that discards every record.

use async_trait::async_trait;
use ironloop_core::error::MemoryError;
use ironloop_core::memory::{TranscriptRecord, TranscriptStore};

pub struct NoopTranscript;

#[async_trait]
impl TranscriptStore for NoopTranscript {
    async fn persist(&self, _record: TranscriptRecord) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn history(&self, _conversation_id: &str) -> Result<Vec<TranscriptRecord>, MemoryError> {
        Ok(Vec::new())
    }
}
