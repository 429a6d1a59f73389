//! Command allowlist for the shell tool.
//!
//! Rules:
//! - An empty list allows every command
//! - `"*"` allows every command
//! - Otherwise the first word must match an entry exactly

use ironloop_core::SecurityError;
use serde::{Deserialize, Serialize};

use crate::shell::command_words;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAllowlist {
    commands: Vec<String>,
}

impl CommandAllowlist {
    pub fn new(commands: impl IntoIterator<Item = String>) -> Self {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// True when no restriction is configured.
    pub fn is_open(&self) -> bool {
        self.commands.is_empty() || self.commands.iter().any(|c| c == "*")
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        if self.is_open() {
            return true;
        }
        let words = command_words(command);
        let base = words.first().map(String::as_str).unwrap_or_default();
        self.commands.iter().any(|c| c == base)
    }

    pub fn check(&self, command: &str) -> Result<(), SecurityError> {
        if self.is_allowed(command) {
            Ok(())
        } else {
            let base = command_words(command).into_iter().next().unwrap_or_default();
            Err(SecurityError::CommandNotAllowed { command: base })
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}
