//! File read tool: read file contents inside the access root.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::{FieldSpec, Tool, ToolResult, ToolSchema};
use serde_json::{Map, Value, json};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::ToolContext;

const DEFAULT_MAX_BYTES: u64 = 64 * 1024;

pub struct FileReadTool {
    ctx: ToolContext,
}

impl FileReadTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Paths are relative to the working root."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::string("path")
                .required()
                .min_len(1)
                .describe("The file path to read"),
            FieldSpec::integer("max_bytes")
                .default_value(json!(DEFAULT_MAX_BYTES))
                .range(1.0, 10.0 * 1024.0 * 1024.0)
                .describe("Read at most this many bytes"),
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or_default();
        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let path = self.ctx.resolve(self.name(), raw)?;
        debug!(path = %path.display(), "Reading file");

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => return Ok(ToolResult::failed("read failed", format!("{raw}: {e}"))),
        };
        let total = file.metadata().await.map(|m| m.len()).unwrap_or(0);

        let mut buf = Vec::new();
        if let Err(e) = file.take(max_bytes).read_to_end(&mut buf).await {
            return Ok(ToolResult::failed("read failed", format!("{raw}: {e}")));
        }

        let mut content = String::from_utf8_lossy(&buf).into_owned();
        if total > max_bytes {
            content.push_str(&format!("\n[truncated: showed {max_bytes} of {total} bytes]"));
        }
        Ok(ToolResult::ok("read", content))
    }
}
