//! The ReAct controller for ironloop.
//!
//! A query runs as a sequence of rounds:
//!
//! 1. **Prompt**: protocol instructions, tool schemas, history (and the
//!    security assessment on round 1)
//! 2. **Stream**: fragments from the resilient client, parsed into events
//! 3. **Act**: `calls` are dispatched one at a time as they are parsed
//! 4. **Observe**: on `execute`, results are folded into history and the
//!    next round starts; `respond` ends the run
//!
//! Every run ends with exactly one terminal event, sent only after the
//! transcript has been written.

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod prompt;
pub mod round;
pub mod stream_event;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use controller::{
    ControllerConfig, INTERRUPTED_MESSAGE, ReactController, RunHandle, RunOutcome, RunRequest,
};
pub use dispatcher::ToolDispatcher;
pub use error::{AgentError, FailureKind};
pub use prompt::PromptBuilder;
pub use round::RoundContext;
pub use stream_event::AgentEvent;
