//! Audit logging for security decisions.
//!
//! Every denied path, rejected command and expired tool scope is recorded here
//! and forwarded to the configured sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use crate::path::AccessLevel;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable security events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A path failed resolution
    PathDenied { path: String, level: AccessLevel },
    /// A shell command failed sanitization
    ShellDenied { command: String },
    /// A tool exceeded its time budget
    ToolTimeout { tool_name: String, timeout_ms: u64 },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Denied,
    Aborted,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Keeps entries in memory and forwards them to sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// Record an audit event.
    pub fn log(&self, event: AuditEvent, actor: &str, outcome: AuditOutcome, details: Option<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            outcome,
            details,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn path_denied(&self, actor: &str, path: &str, level: AccessLevel, reason: &str) {
        self.log(
            AuditEvent::PathDenied {
                path: path.into(),
                level,
            },
            actor,
            AuditOutcome::Denied,
            Some(reason.into()),
        );
    }

    pub fn shell_denied(&self, actor: &str, command: &str, reason: &str) {
        self.log(
            AuditEvent::ShellDenied {
                command: command.into(),
            },
            actor,
            AuditOutcome::Denied,
            Some(reason.into()),
        );
    }

    pub fn tool_timeout(&self, actor: &str, tool_name: &str, timeout_ms: u64) {
        self.log(
            AuditEvent::ToolTimeout {
                tool_name: tool_name.into(),
                timeout_ms,
            },
            actor,
            AuditOutcome::Aborted,
            None,
        );
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::warn!`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::warn!(
            event = ?entry.event,
            actor = %entry.actor,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct CountingSink(Arc<Mutex<usize>>);

    impl AuditSink for CountingSink {
        fn record(&self, _entry: &AuditEntry) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn log_and_retrieve_entries() {
        let logger = AuditLogger::new();
        logger.path_denied("agent", "../etc/passwd", AccessLevel::Sandbox, "traversal");
        logger.shell_denied("agent", "ls; rm", "metacharacter ';'");
        logger.tool_timeout("agent", "shell", 30_000);

        assert_eq!(logger.count(), 3);
        let entries = logger.entries();
        assert_eq!(
            entries[0].event,
            AuditEvent::PathDenied {
                path: "../etc/passwd".into(),
                level: AccessLevel::Sandbox
            }
        );
        assert_eq!(entries[1].outcome, AuditOutcome::Denied);
        assert_eq!(entries[2].outcome, AuditOutcome::Aborted);
    }

    #[test]
    fn entries_forwarded_to_sinks() {
        let count = Arc::new(Mutex::new(0));
        let logger = AuditLogger::with_sinks(vec![
            Box::new(CountingSink(count.clone())),
            Box::new(TracingAuditSink),
        ]);
        logger.shell_denied("agent", "echo $HOME", "metacharacter '$'");
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn audit_entry_serialization() {
        let logger = AuditLogger::new();
        logger.tool_timeout("agent", "shell", 5);
        let json = serde_json::to_string(&logger.entries()[0]).unwrap();
        assert!(json.contains("tool_timeout"));
        assert!(json.contains("aborted"));
    }

    #[test]
    fn debug_shows_counts() {
        let logger = AuditLogger::new();
        logger.shell_denied("agent", "x;y", "metacharacter");
        let debug = format!("{logger:?}");
        assert!(debug.contains("entry_count: 1"));
    }
}
