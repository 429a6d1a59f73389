//! File write tool: create, overwrite or append to files inside the access root.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::{FieldSpec, Tool, ToolResult, ToolSchema};
use serde_json::{Map, Value, json};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::ToolContext;

pub struct FileWriteTool {
    ctx: ToolContext,
}

impl FileWriteTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text to a file, creating parent directories as needed. Set append to add to the end instead of replacing."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::string("path").required().min_len(1),
            FieldSpec::string("content").required(),
            FieldSpec::boolean("append").default_value(json!(false)),
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or_default();
        let content = args.get("content").and_then(Value::as_str).unwrap_or_default();
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);

        let path = self.ctx.resolve(self.name(), raw)?;
        debug!(path = %path.display(), append, bytes = content.len(), "Writing file");

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed("write failed", format!("{raw}: {e}")));
        }

        let written = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&path)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                let verb = if append { "appended" } else { "wrote" };
                Ok(ToolResult::ok(
                    "written",
                    format!("{verb} {} bytes to {raw}", content.len()),
                ))
            }
            Err(e) => Ok(ToolResult::failed("write failed", format!("{raw}: {e}"))),
        }
    }
}
