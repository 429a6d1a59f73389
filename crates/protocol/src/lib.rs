//! # ironloop protocol
//!
//! The streamed, section-delimited format the model writes:
//!
//! ```text
//! §think <reasoning>
//! §calls [{"name": "calculator", "args": {"expression": "15*8+23"}}]
//! §execute
//! §respond <answer>
//! §end
//! ```
//!
//! Keywords are case-insensitive on input and always written lower-case.
//! [`ProtocolParser`] turns arbitrarily split fragments into [`Event`]s;
//! [`parse`] runs it as a task over a fragment channel.

pub mod event;
pub mod parser;
pub mod stream;

pub use event::{DELIMITER, Event, Keyword, coalesce, render};
pub use parser::{ProtocolError, ProtocolParser, parse_str};
pub use stream::{EventReceiver, parse};
