//! Protocol events and their wire form.

use ironloop_core::{MetricStep, MetricTotal, ToolCall};
use serde::{Deserialize, Serialize};

/// The reserved delimiter symbol.
pub const DELIMITER: char = '§';

/// Section keywords, as emitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Think,
    Calls,
    Execute,
    Respond,
    End,
}

impl Keyword {
    pub const ALL: [Keyword; 5] = [
        Keyword::Think,
        Keyword::Calls,
        Keyword::Execute,
        Keyword::Respond,
        Keyword::End,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::Calls => "calls",
            Self::Execute => "execute",
            Self::Respond => "respond",
            Self::End => "end",
        }
    }

    /// Case-insensitive exact match.
    pub fn parse(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(word))
    }

    /// Whether `partial` could still grow into some keyword.
    pub fn is_prefix(partial: &str) -> bool {
        Self::ALL.into_iter().any(|k| {
            let kw = k.as_str();
            kw.len() >= partial.len() && kw[..partial.len()].eq_ignore_ascii_case(partial)
        })
    }
}

/// A typed protocol event. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reasoning text, streamed per fragment
    Think { content: String },
    /// Tool calls parsed from one `calls` section
    Calls { calls: Vec<ToolCall> },
    /// Hard stop: run the tools
    Execute,
    /// User-facing answer text, streamed per fragment
    Respond { content: String },
    /// Terminal marker
    End,
    /// A recoverable protocol problem, e.g. malformed `calls` JSON
    Error { content: String },
    /// Per-round measurements, produced by the controller
    Metric { step: MetricStep, total: MetricTotal },
}

impl Event {
    pub fn think(content: impl Into<String>) -> Self {
        Self::Think {
            content: content.into(),
        }
    }

    pub fn respond(content: impl Into<String>) -> Self {
        Self::Respond {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }
}

/// Merge adjacent `Think` events, and adjacent `Respond` events.
///
/// The parser streams free text per fragment, so only the coalesced sequence
/// is independent of where fragment boundaries fell.
pub fn coalesce(events: impl IntoIterator<Item = Event>) -> Vec<Event> {
    let mut out: Vec<Event> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(Event::Think { content }), Event::Think { content: more }) => {
                content.push_str(&more)
            }
            (Some(Event::Respond { content }), Event::Respond { content: more }) => {
                content.push_str(&more)
            }
            (_, event) => out.push(event),
        }
    }
    out
}

/// Write events back to wire form. `Error` and `Metric` have no wire form.
pub fn render(events: &[Event]) -> String {
    let mut out = String::new();
    for event in events {
        match event {
            Event::Think { content } => push_section(&mut out, Keyword::Think, content),
            Event::Calls { calls } => {
                let json = serde_json::to_string(calls).unwrap_or_else(|_| "[]".into());
                push_section(&mut out, Keyword::Calls, &json);
            }
            Event::Execute => push_section(&mut out, Keyword::Execute, ""),
            Event::Respond { content } => push_section(&mut out, Keyword::Respond, content),
            Event::End => push_section(&mut out, Keyword::End, ""),
            Event::Error { .. } | Event::Metric { .. } => {}
        }
    }
    out
}

fn push_section(out: &mut String, keyword: Keyword, body: &str) {
    out.push(DELIMITER);
    out.push_str(keyword.as_str());
    if !body.is_empty() {
        out.push(' ');
        out.push_str(body);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_matching() {
        assert_eq!(Keyword::parse("THINK"), Some(Keyword::Think));
        assert_eq!(Keyword::parse("Respond"), Some(Keyword::Respond));
        assert_eq!(Keyword::parse("thinking"), None);
        assert!(Keyword::is_prefix("ex"));
        assert!(Keyword::is_prefix("EXEC"));
        assert!(Keyword::is_prefix(""));
        assert!(!Keyword::is_prefix("thinking"));
        assert!(!Keyword::is_prefix("x"));
    }

    #[test]
    fn coalesce_merges_adjacent_text_only() {
        let events = vec![
            Event::think("a"),
            Event::think("b"),
            Event::Execute,
            Event::respond("c"),
            Event::error("bad"),
            Event::respond("d"),
            Event::respond("e"),
        ];
        assert_eq!(
            coalesce(events),
            vec![
                Event::think("ab"),
                Event::Execute,
                Event::respond("c"),
                Event::error("bad"),
                Event::respond("de"),
            ]
        );
    }

    #[test]
    fn render_writes_lowercase_sections() {
        let events = vec![
            Event::think("plan"),
            Event::Calls {
                calls: vec![ToolCall::new("calculator", json!({"expression": "1+1"}))],
            },
            Event::Execute,
            Event::error("skipped"),
        ];
        assert_eq!(
            render(&events),
            "§think plan\n§calls [{\"name\":\"calculator\",\"args\":{\"expression\":\"1+1\"}}]\n§execute\n"
        );
    }

    #[test]
    fn event_serialization_is_tagged() {
        let json = serde_json::to_value(Event::respond("143")).unwrap();
        assert_eq!(json, json!({"type": "respond", "content": "143"}));
        let json = serde_json::to_value(Event::End).unwrap();
        assert_eq!(json, json!({"type": "end"}));
    }
}
