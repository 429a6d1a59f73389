//! Transcript and working-memory collaborators for ironloop.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileTranscript;
pub use in_memory::{InMemoryTranscript, InMemoryWorkingMemory};
pub use noop::NoopTranscript;

use ironloop_config::{MemorySettings, TranscriptBackend};
use ironloop_core::memory::TranscriptStore;
use std::sync::Arc;

/// Build the transcript store selected in config.
pub fn transcript_from_config(settings: &MemorySettings) -> Arc<dyn TranscriptStore> {
    match settings.transcript {
        TranscriptBackend::Memory => Arc::new(InMemoryTranscript::new()),
        TranscriptBackend::File => Arc::new(FileTranscript::new(&settings.transcript_path)),
        TranscriptBackend::Off => Arc::new(NoopTranscript),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloop_core::memory::{TranscriptRecord, TranscriptStatus};

    #[tokio::test]
    async fn off_backend_discards_records() {
        let settings = MemorySettings {
            transcript: TranscriptBackend::Off,
            ..MemorySettings::default()
        };
        let store = transcript_from_config(&settings);
        store
            .persist(TranscriptRecord::new("u", "c", "q", "r", TranscriptStatus::Completed))
            .await
            .unwrap();
        assert!(store.history("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_backend_keeps_records() {
        let settings = MemorySettings {
            transcript: TranscriptBackend::Memory,
            ..MemorySettings::default()
        };
        let store = transcript_from_config(&settings);
        store
            .persist(TranscriptRecord::new("u", "c", "q", "r", TranscriptStatus::Completed))
            .await
            .unwrap();
        assert_eq!(store.history("c").await.unwrap().len(), 1);
    }
}
