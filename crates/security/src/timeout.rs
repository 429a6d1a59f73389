//! Bounded-duration execution scope for tool invocations.

use ironloop_core::ToolError;
use std::future::Future;
use std::time::Duration;

/// The scope expired before the wrapped future finished.
///
/// Distinct from anything the wrapped future itself can return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{label} timed out after {}ms", after.as_millis())]
pub struct TimeoutError {
    pub label: String,
    pub after: Duration,
}

impl TimeoutError {
    pub fn into_tool_error(self) -> ToolError {
        ToolError::Timeout {
            tool_name: self.label,
            timeout_ms: u64::try_from(self.after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Run `fut` for at most `duration`.
///
/// The future is dropped on expiry, which cancels it at its next await point.
pub async fn timeout_context<F>(
    duration: Duration,
    label: &str,
    fut: F,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| TimeoutError {
            label: label.to_string(),
            after: duration,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_is_distinct_from_inner_failure() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err::<(), &str>("never reached")
        };
        let err = timeout_context(Duration::from_secs(1), "shell", slow)
            .await
            .unwrap_err();
        assert_eq!(err.label, "shell");
        assert_eq!(err.after, Duration::from_secs(1));

        let failing = async { Err::<(), &str>("tool broke") };
        let inner = timeout_context(Duration::from_secs(1), "shell", failing).await;
        assert_eq!(inner, Ok(Err("tool broke")));
    }

    #[test]
    fn converts_to_tool_timeout() {
        let err = TimeoutError {
            label: "calculator".into(),
            after: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("1500ms"));
        assert_eq!(
            err.into_tool_error(),
            ToolError::Timeout {
                tool_name: "calculator".into(),
                timeout_ms: 1500
            }
        );
    }
}
