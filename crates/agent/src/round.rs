//! Per-query round state.
//!
//! A `RoundContext` lives for exactly one query. It owns the history that is
//! replayed to the model each round and the tool calls of the round in
//! flight; nothing in it is shared with other sessions.

use ironloop_core::{Message, ToolCall, ToolResult};

#[derive(Debug, Clone)]
pub struct RoundContext {
    query: String,
    messages: Vec<Message>,
    iteration: u32,
    security_preamble_sent: bool,
    pending: Vec<ToolCall>,
    completed: Vec<(ToolCall, ToolResult)>,
    last_respond: Option<String>,
    tool_calls_made: u32,
}

impl RoundContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            messages: Vec::new(),
            iteration: 0,
            security_preamble_sent: false,
            pending: Vec::new(),
            completed: Vec::new(),
            last_respond: None,
            tool_calls_made: 0,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// History after the user query: assistant output, folded results, notes.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Start the next round and return its 1-based number.
    pub fn begin_round(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// The security preamble goes out with the first round only.
    pub fn needs_security_preamble(&self) -> bool {
        self.iteration <= 1 && !self.security_preamble_sent
    }

    pub fn mark_security_preamble_sent(&mut self) {
        self.security_preamble_sent = true;
    }

    pub fn queue_calls(&mut self, calls: &[ToolCall]) {
        self.pending.extend_from_slice(calls);
    }

    /// Move a dispatched call from pending to completed.
    pub fn complete_call(&mut self, call: ToolCall, result: ToolResult) {
        if let Some(pos) = self.pending.iter().position(|c| *c == call) {
            self.pending.remove(pos);
        }
        self.tool_calls_made += 1;
        self.completed.push((call, result));
    }

    pub fn pending(&self) -> &[ToolCall] {
        &self.pending
    }

    pub fn completed(&self) -> &[(ToolCall, ToolResult)] {
        &self.completed
    }

    pub fn tool_calls_made(&self) -> u32 {
        self.tool_calls_made
    }

    /// Record what the model said this round, in wire form.
    pub fn record_assistant(&mut self, raw: impl Into<String>) {
        let raw = raw.into();
        if !raw.trim().is_empty() {
            self.messages.push(Message::assistant(raw));
        }
    }

    /// Fold this round's tool results into one message for the next round.
    ///
    /// Returns `false` when there was nothing to fold.
    pub fn fold_results(&mut self) -> bool {
        self.pending.clear();
        if self.completed.is_empty() {
            return false;
        }
        let mut folded = String::from("Tool results:\n");
        for (call, result) in self.completed.drain(..) {
            folded.push_str(&format!("- {}: {}\n", call.name, result.render()));
        }
        self.messages.push(Message::tool(folded.trim_end()));
        true
    }

    /// Tell the model how its previous output broke the protocol.
    pub fn note_correction(&mut self, note: impl Into<String>) {
        self.messages
            .push(Message::system(format!("Protocol note: {}", note.into())));
    }

    pub fn set_last_respond(&mut self, content: impl Into<String>) {
        let content = content.into();
        if !content.trim().is_empty() {
            self.last_respond = Some(content.trim().to_string());
        }
    }

    pub fn last_respond(&self) -> Option<&str> {
        self.last_respond.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloop_core::Role;
    use serde_json::json;

    #[test]
    fn preamble_only_before_first_round_completes() {
        let mut ctx = RoundContext::new("q");
        assert_eq!(ctx.begin_round(), 1);
        assert!(ctx.needs_security_preamble());
        ctx.mark_security_preamble_sent();
        assert!(!ctx.needs_security_preamble());
        assert_eq!(ctx.begin_round(), 2);
        assert!(!ctx.needs_security_preamble());
    }

    #[test]
    fn fold_moves_completed_into_history() {
        let mut ctx = RoundContext::new("q");
        let call = ToolCall::new("calculator", json!({"expression": "15*8+23"}));
        ctx.queue_calls(std::slice::from_ref(&call));
        assert_eq!(ctx.pending().len(), 1);
        ctx.complete_call(call, ToolResult::ok("calculated", "143"));
        assert!(ctx.pending().is_empty());

        assert!(ctx.fold_results());
        assert!(ctx.completed().is_empty());
        let last = ctx.messages().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("calculator: ok (calculated): 143"));
        assert_eq!(ctx.tool_calls_made(), 1);
        assert!(!ctx.fold_results());
    }

    #[test]
    fn blank_respond_does_not_replace_last_answer() {
        let mut ctx = RoundContext::new("q");
        ctx.set_last_respond(" 143 ");
        ctx.set_last_respond("  ");
        assert_eq!(ctx.last_respond(), Some("143"));
    }
}
