//! Directory listing tool.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::{FieldSpec, Tool, ToolResult, ToolSchema};
use serde_json::{Map, Value, json};

use crate::ToolContext;

/// Entries beyond this are summarised, not listed.
const MAX_ENTRIES: usize = 500;

pub struct ListDirTool {
    ctx: ToolContext,
}

impl ListDirTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are shown with a trailing slash."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::string("path")
                .default_value(json!("."))
                .describe("Directory to list, relative to the working root"),
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = if raw.trim().is_empty() || raw.trim() == "." {
            self.ctx.root().to_path_buf()
        } else {
            self.ctx.resolve(self.name(), raw)?
        };

        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::failed("list failed", format!("{raw}: {e}"))),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failed("list failed", format!("{raw}: {e}"))),
            }
        }
        entries.sort();

        let total = entries.len();
        if total == 0 {
            return Ok(ToolResult::ok("listed", "(empty)"));
        }
        entries.truncate(MAX_ENTRIES);
        let mut listing = entries.join("\n");
        if total > MAX_ENTRIES {
            listing.push_str(&format!("\n[{} more entries]", total - MAX_ENTRIES));
        }
        Ok(ToolResult::ok("listed", listing))
    }
}
