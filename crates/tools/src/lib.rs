//! Built-in tool implementations for ironloop.
//!
//! Tools give the agent the ability to act: do math, read and write files
//! inside the access root, list directories, and run vetted shell commands.
//! Every filesystem or shell argument goes through the security layer first;
//! a denied input is audited and never executed.

pub mod calculator;
pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod shell;

use ironloop_core::error::ToolError;
use ironloop_core::tool::ToolRegistry;
use ironloop_core::error::SecurityError;
use ironloop_security::{
    AccessLevel, AuditLogger, CommandAllowlist, PathGuard, command_words, is_path_like,
    sanitize_shell,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Matches the agent's default per-call limit.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// What the filesystem and shell tools are allowed to touch.
#[derive(Debug, Clone)]
pub struct ToolContext {
    guard: PathGuard,
    allowlist: CommandAllowlist,
    tool_timeout: Duration,
    audit: Arc<AuditLogger>,
}

impl ToolContext {
    pub fn new(access_level: AccessLevel, root: impl Into<PathBuf>) -> Self {
        Self {
            guard: PathGuard::new(access_level, root),
            allowlist: CommandAllowlist::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            audit: Arc::new(AuditLogger::new()),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Extra deny-list entries.
    pub fn with_forbidden(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.guard = self.guard.with_forbidden(extra);
        self
    }

    /// Programs the shell tool may run; empty allows any.
    pub fn with_allowed_commands(mut self, commands: impl IntoIterator<Item = String>) -> Self {
        self.allowlist = CommandAllowlist::new(commands);
        self
    }

    /// The outer per-call limit the dispatcher enforces. Tools never offer
    /// a longer timeout than this.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    pub fn access_level(&self) -> AccessLevel {
        self.guard.level()
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Resolve a tool's path argument, auditing any denial.
    pub fn resolve(&self, tool_name: &str, raw: &str) -> Result<PathBuf, ToolError> {
        self.guard.resolve(raw).map_err(|e| {
            self.audit
                .path_denied(tool_name, raw, self.guard.level(), &e.to_string());
            ToolError::Security(e)
        })
    }

    /// Vet a shell command, auditing any denial.
    ///
    /// On top of metacharacter sanitization the base command must pass the
    /// allowlist, and every path-like word (or `--opt=value` value) must
    /// resolve under the access level.
    pub fn sanitize(&self, tool_name: &str, command: &str) -> Result<String, ToolError> {
        sanitize_shell(command)
            .and_then(|command| {
                self.allowlist.check(&command)?;
                self.check_path_words(&command)?;
                Ok(command)
            })
            .map_err(|e| {
                self.audit.shell_denied(tool_name, command, &e.to_string());
                ToolError::Security(e)
            })
    }

    fn check_path_words(&self, command: &str) -> Result<(), SecurityError> {
        for word in command_words(command) {
            let value = word.split_once('=').map(|(_, value)| value);
            for candidate in std::iter::once(word.as_str()).chain(value) {
                if is_path_like(candidate) {
                    self.guard.resolve(candidate)?;
                }
            }
        }
        Ok(())
    }
}

/// Create a registry with every built-in tool bound to `ctx`.
pub fn default_registry(ctx: ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(file_read::FileReadTool::new(ctx.clone())));
    registry.register(Box::new(file_write::FileWriteTool::new(ctx.clone())));
    registry.register(Box::new(list_dir::ListDirTool::new(ctx.clone())));
    registry.register(Box::new(shell::ShellTool::new(ctx)));
    registry
}
