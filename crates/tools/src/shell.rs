//! Shell tool: run a vetted command in the working root.
//!
//! The command is vetted by the tool context before anything is spawned, so
//! chaining, redirection and substitution never reach `sh`, and neither do
//! programs outside the allowlist or paths outside the access level.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::{FieldSpec, Tool, ToolResult, ToolSchema};
use ironloop_security::timeout_context;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ToolContext;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Output kept per stream.
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub struct ShellTool {
    ctx: ToolContext,
}

impl ShellTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    /// The dispatcher cuts every call off at the context's tool timeout, so
    /// nothing longer is offered.
    fn max_timeout_secs(&self) -> u64 {
        self.ctx.tool_timeout().as_secs().max(1)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a single shell command in the working root and return its output. Pipes, redirection, chaining and substitution are rejected."
    }

    fn schema(&self) -> ToolSchema {
        let max_secs = self.max_timeout_secs();
        ToolSchema::new(vec![
            FieldSpec::string("command")
                .required()
                .min_len(1)
                .describe("The command to run, e.g. 'ls -la'"),
            FieldSpec::integer("timeout_secs")
                .default_value(json!(DEFAULT_TIMEOUT_SECS.min(max_secs)))
                .range(1.0, max_secs as f64),
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let raw = args.get("command").and_then(Value::as_str).unwrap_or_default();
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(self.max_timeout_secs());

        let command = self.ctx.sanitize(self.name(), raw)?;
        let root = self.ctx.root();
        if !root.is_dir() {
            return Ok(ToolResult::failed(
                "execution failed",
                format!("working root {} does not exist", root.display()),
            ));
        }

        debug!(command = %command, root = %root.display(), "Executing shell command");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &command]).current_dir(root).kill_on_drop(true);

        let output = match timeout_context(Duration::from_secs(timeout_secs), self.name(), cmd.output()).await {
            Ok(output) => output.map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?,
            Err(expired) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                self.ctx
                    .audit()
                    .tool_timeout(self.name(), self.name(), timeout_secs * 1000);
                return Err(expired.into_tool_error());
            }
        };

        let stdout = clip(&output.stdout);
        let stderr = clip(&output.stderr);

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolResult::ok("exit 0", text.trim().to_string()))
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let text = format!("{stdout}\n{stderr}");
            Ok(ToolResult::failed(format!("exit {code}"), text.trim().to_string()))
        }
    }
}

fn clip(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_OUTPUT_BYTES);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if bytes.len() > MAX_OUTPUT_BYTES {
        text.push_str("\n[output truncated]");
    }
    text
}
