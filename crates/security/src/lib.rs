//! Security layer for ironloop: path confinement, shell sanitization,
//! bounded execution, and audit logging.
//!
//! Provides:
//! - **Path resolution**: graduated access levels (sandbox, project, system)
//! - **Shell sanitization**: quote-aware metacharacter rejection
//! - **Command allowlist**: optional restriction on which programs the shell may run
//! - **Execution guard**: `timeout_context` with a distinct timeout error
//! - **Audit logging**: every denial is recorded

pub mod allowlist;
pub mod audit;
pub mod path;
pub mod shell;
pub mod timeout;

pub use allowlist::CommandAllowlist;
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingAuditSink};
pub use path::{AccessLevel, DEFAULT_FORBIDDEN_ROOTS, PathGuard, is_path_like, resolve_path};
pub use shell::{command_words, sanitize_shell};
pub use timeout::{TimeoutError, timeout_context};
