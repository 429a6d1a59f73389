//! Incremental section parser.
//!
//! `ProtocolParser` is a synchronous state machine: feed it fragments in order,
//! collect the events each call returns, then call [`ProtocolParser::finish`].
//! One parser per round; it cannot be restarted.
//!
//! A `§` that might still turn into a delimiter is never emitted. The parser
//! holds back the `§` and any letters after it until a non-letter arrives,
//! the letters stop matching a keyword prefix, or the stream ends.

use ironloop_core::ToolCall;
use tracing::debug;

use crate::event::{DELIMITER, Event, Keyword};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("input is not valid UTF-8 at byte offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("input ended inside a UTF-8 sequence ({pending} dangling bytes)")]
    TruncatedUtf8 { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Text before the first delimiter; treated as reasoning
    Preamble,
    Think,
    Calls,
    Respond,
}

/// What a `§` at the head of the buffer turned out to be.
enum Lookahead {
    Delimiter { keyword: Keyword, len: usize },
    Literal,
    Undecided,
}

/// Raw `calls` payload plus enough JSON lexing state to know whether a `§`
/// sits inside a string literal.
#[derive(Debug, Default)]
struct CallsBuffer {
    text: String,
    in_string: bool,
    escaped: bool,
}

impl CallsBuffer {
    fn push(&mut self, ch: char) {
        self.text.push(ch);
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
        } else if ch == '"' {
            self.in_string = true;
        }
    }

    fn take(&mut self) -> String {
        let text = std::mem::take(&mut self.text);
        self.in_string = false;
        self.escaped = false;
        text
    }
}

#[derive(Debug)]
pub struct ProtocolParser {
    /// Unprocessed input, always starting at an undecided `§` when non-empty
    buf: String,
    section: Section,
    /// Leading whitespace of a section is never emitted
    section_start: bool,
    /// Trailing whitespace, held until later text proves it interior
    pending_ws: String,
    calls: CallsBuffer,
    halted: bool,
    /// Incomplete UTF-8 sequence carried between `feed_bytes` calls
    carry: Vec<u8>,
    bytes_seen: usize,
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            section: Section::Preamble,
            section_start: true,
            pending_ws: String::new(),
            calls: CallsBuffer::default(),
            halted: false,
            carry: Vec::new(),
            bytes_seen: 0,
        }
    }

    /// True once `execute` or `end` was seen, or after `finish`.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Consume one text fragment.
    pub fn feed(&mut self, fragment: &str) -> Vec<Event> {
        let mut out = Vec::new();
        if self.halted {
            return out;
        }
        self.buf.push_str(fragment);
        self.process(false, &mut out);
        out
    }

    /// Consume raw bytes, carrying an incomplete trailing UTF-8 sequence over
    /// to the next call. Invalid UTF-8 is an error, never replaced.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Event>, ProtocolError> {
        if self.halted {
            return Ok(Vec::new());
        }
        self.carry.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(ProtocolError::InvalidUtf8 {
                    offset: self.bytes_seen + e.valid_up_to(),
                });
            }
        };

        let complete: Vec<u8> = self.carry.drain(..valid_up_to).collect();
        let text = String::from_utf8(complete).map_err(|e| ProtocolError::InvalidUtf8 {
            offset: self.bytes_seen + e.utf8_error().valid_up_to(),
        })?;
        self.bytes_seen += valid_up_to;
        Ok(self.feed(&text))
    }

    /// Byte-level counterpart of [`finish`](Self::finish).
    pub fn finish_bytes(&mut self) -> Result<Vec<Event>, ProtocolError> {
        if !self.carry.is_empty() && !self.halted {
            return Err(ProtocolError::TruncatedUtf8 {
                pending: self.carry.len(),
            });
        }
        Ok(self.finish())
    }

    /// Signal end of stream: resolve held-back input and flush the open section.
    ///
    /// A round that never reached `execute` or `end` simply ends here; no
    /// `Execute` is synthesized.
    pub fn finish(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        if self.halted {
            return out;
        }
        self.process(true, &mut out);
        if !self.halted {
            self.close_section(&mut out);
            self.halted = true;
        }
        out
    }

    fn process(&mut self, at_end: bool, out: &mut Vec<Event>) {
        let buf = std::mem::take(&mut self.buf);
        let mut i = 0;

        while i < buf.len() && !self.halted {
            let rest = &buf[i..];

            // Advance to the next `§` that can be a delimiter.
            let found = if self.section == Section::Calls {
                let mut found = None;
                for (offset, ch) in rest.char_indices() {
                    if ch == DELIMITER && !self.calls.in_string {
                        found = Some(offset);
                        break;
                    }
                    self.calls.push(ch);
                }
                found
            } else {
                let found = rest.find(DELIMITER);
                self.emit_text(&rest[..found.unwrap_or(rest.len())], out);
                found
            };
            let Some(offset) = found else {
                break;
            };
            i += offset;

            match lookahead(&buf[i..], at_end) {
                Lookahead::Undecided => {
                    self.buf = buf[i..].to_string();
                    return;
                }
                Lookahead::Literal => {
                    if self.section == Section::Calls {
                        self.calls.push(DELIMITER);
                    } else {
                        let mut literal = [0u8; 4];
                        self.emit_text(DELIMITER.encode_utf8(&mut literal), out);
                    }
                    i += DELIMITER.len_utf8();
                }
                Lookahead::Delimiter { keyword, len } => {
                    i += len;
                    self.enter(keyword, out);
                }
            }
        }
    }

    fn enter(&mut self, keyword: Keyword, out: &mut Vec<Event>) {
        self.close_section(out);
        debug!(section = keyword.as_str(), "Protocol section");

        match keyword {
            Keyword::Think => self.open(Section::Think),
            Keyword::Respond => self.open(Section::Respond),
            Keyword::Calls => self.open(Section::Calls),
            Keyword::Execute => {
                out.push(Event::Execute);
                self.halted = true;
            }
            Keyword::End => {
                out.push(Event::End);
                self.halted = true;
            }
        }
    }

    fn open(&mut self, section: Section) {
        self.section = section;
        self.section_start = true;
        self.pending_ws.clear();
        self.calls.take();
    }

    fn close_section(&mut self, out: &mut Vec<Event>) {
        match self.section {
            Section::Calls => out.push(parse_calls(&self.calls.take())),
            _ => self.pending_ws.clear(),
        }
    }

    fn emit_text(&mut self, text: &str, out: &mut Vec<Event>) {
        let mut text = text;
        if self.section_start {
            text = text.trim_start();
            if text.is_empty() {
                return;
            }
            self.section_start = false;
        }

        self.pending_ws.push_str(text);
        let content_len = self.pending_ws.trim_end().len();
        if content_len == 0 {
            return;
        }
        let tail = self.pending_ws.split_off(content_len);
        let content = std::mem::replace(&mut self.pending_ws, tail);

        out.push(match self.section {
            Section::Respond => Event::Respond { content },
            _ => Event::Think { content },
        });
    }
}

/// Classify the `§` at the start of `input`.
fn lookahead(input: &str, at_end: bool) -> Lookahead {
    let after = &input[DELIMITER.len_utf8()..];
    let word_len = after
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(after.len());
    let word = &after[..word_len];

    if word_len == after.len() && !at_end {
        return if Keyword::is_prefix(word) {
            Lookahead::Undecided
        } else {
            Lookahead::Literal
        };
    }

    match Keyword::parse(word) {
        Some(keyword) => Lookahead::Delimiter {
            keyword,
            len: DELIMITER.len_utf8() + word_len,
        },
        None => Lookahead::Literal,
    }
}

/// Strict JSON-array parse of a `calls` payload.
fn parse_calls(raw: &str) -> Event {
    let payload = raw.trim();
    match serde_json::from_str::<Vec<ToolCall>>(payload) {
        Ok(calls) => Event::Calls { calls },
        Err(e) => {
            debug!(error = %e, "Malformed calls section");
            let preview: String = payload.chars().take(120).collect();
            Event::Error {
                content: format!("malformed calls section ({e}): {preview}"),
            }
        }
    }
}

/// Parse a complete string in one go.
pub fn parse_str(input: &str) -> Vec<Event> {
    let mut parser = ProtocolParser::new();
    let mut events = parser.feed(input);
    events.extend(parser.finish());
    events
}
