//! Errors a run can end with, and their serializable kinds.

use ironloop_core::{ProviderError, SecurityError, ToolError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a run failed. Stream consumers branch on this, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Provider,
    Tool,
    Security,
    Persistence,
    IterationLimit,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(ToolError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("Failed to persist transcript: {0}")]
    Persistence(String),

    #[error("Could not complete within {max_iterations} iterations")]
    IterationLimit { max_iterations: u32 },

    #[error("Task interrupted by user")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ToolError> for AgentError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Security(inner) => Self::Security(inner),
            other => Self::Tool(other),
        }
    }
}

impl AgentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Provider(_) => FailureKind::Provider,
            Self::Tool(_) => FailureKind::Tool,
            Self::Security(_) => FailureKind::Security,
            Self::Persistence(_) => FailureKind::Persistence,
            Self::IterationLimit { .. } => FailureKind::IterationLimit,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Internal(_) => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_security_errors_surface_as_security() {
        let err: AgentError = ToolError::Security(SecurityError::EmptyCommand).into();
        assert_eq!(err.kind(), FailureKind::Security);

        let err: AgentError = ToolError::Timeout {
            tool_name: "shell".into(),
            timeout_ms: 1000,
        }
        .into();
        assert_eq!(err.kind(), FailureKind::Tool);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::IterationLimit).unwrap();
        assert_eq!(json, r#""iteration_limit""#);
    }
}
