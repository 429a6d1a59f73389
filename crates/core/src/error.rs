//! Error types for the ironloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; callers branch on the kind,
//! never on message text.

use thiserror::Error;

/// The top-level error type for ironloop operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API key quota exhausted: {message}")]
    QuotaExhausted { message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider stream yielded a non-text chunk: {0}")]
    NonTextChunk(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Key rotation failed: {message}")]
    KeyRotation { message: String },

    #[error("Circuit open for provider '{provider}', retry in {retry_in_secs}s")]
    CircuitOpen { provider: String, retry_in_secs: u64 },
}

impl ProviderError {
    /// Transient throttling that a fresh key may get past.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::ApiError { status_code, .. } => *status_code == 429,
            _ => false,
        }
    }

    /// The key's quota is gone for good; it should leave the rotation pool.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            Self::QuotaExhausted { .. } => true,
            Self::ApiError { status_code, message } => {
                *status_code == 402 || message.contains("insufficient_quota")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments did not match the tool's schema. Recoverable: the dispatcher
    /// turns this into a failed `ToolResult` the agent can read.
    #[error("Invalid arguments for {tool_name}: {reason}")]
    Validation { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),
}

impl ToolError {
    /// True for schema/argument failures, which are agent mistakes rather than faults.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Path is empty")]
    EmptyPath,

    #[error("Path contains a null byte")]
    NullByte,

    #[error("Absolute path '{path}' is not allowed at {level} access")]
    AbsolutePathDenied { path: String, level: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' resolves outside '{root}'")]
    OutsideRoot { path: String, root: String },

    #[error("Path '{path}' is under forbidden root '{forbidden}'")]
    ForbiddenPath { path: String, forbidden: String },

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Unquoted shell metacharacter {ch:?} at position {position}")]
    ShellMetacharacter { ch: char, position: usize },

    #[error("Unbalanced {quote} quote in command")]
    UnbalancedQuote { quote: char },

    #[error("Command ends with a dangling escape")]
    TrailingEscape,

    #[error("Command '{command}' is not in the allowlist")]
    CommandNotAllowed { command: String },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn rate_limit_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_rate_limit());
        assert!(
            ProviderError::ApiError { status_code: 429, message: String::new() }.is_rate_limit()
        );
        assert!(!ProviderError::Network("reset".into()).is_rate_limit());
    }

    #[test]
    fn quota_classification() {
        assert!(ProviderError::QuotaExhausted { message: "gone".into() }.is_quota_exhausted());
        assert!(
            ProviderError::ApiError {
                status_code: 400,
                message: r#"{"error":{"code":"insufficient_quota"}}"#.into(),
            }
            .is_quota_exhausted()
        );
        assert!(!ProviderError::RateLimited { retry_after_secs: 1 }.is_quota_exhausted());
    }

    #[test]
    fn validation_kind_is_distinguishable() {
        let validation = ToolError::Validation {
            tool_name: "calculator".into(),
            reason: "missing field 'expression'".into(),
        };
        let fault = ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: "spawn failed".into(),
        };
        assert!(validation.is_validation());
        assert!(!fault.is_validation());
        assert!(!ToolError::Security(SecurityError::EmptyPath).is_validation());
    }

    #[test]
    fn security_error_displays_correctly() {
        let err = Error::Security(SecurityError::ShellMetacharacter { ch: ';', position: 3 });
        assert!(err.to_string().contains("';'"));
        assert!(err.to_string().contains('3'));
    }
}
