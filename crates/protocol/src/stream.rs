//! Channel-driven parsing: the parser runs as a task between the provider
//! stream and the controller.

use ironloop_core::{FragmentReceiver, ProviderError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::Event;
use crate::parser::ProtocolParser;

/// Receiving half of a parsed event stream.
pub type EventReceiver = mpsc::Receiver<Result<Event, ProviderError>>;

/// Spawn a parser task over `input`.
///
/// The task stops reading as soon as the round halts (`execute` or `end`),
/// when the input ends, or when the receiver is dropped. A provider error is
/// forwarded once and ends the sequence.
pub fn parse(mut input: FragmentReceiver, capacity: usize) -> EventReceiver {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut parser = ProtocolParser::new();

        while let Some(fragment) = input.recv().await {
            match fragment {
                Ok(text) => {
                    for event in parser.feed(&text) {
                        if tx.send(Ok(event)).await.is_err() {
                            debug!("Event receiver dropped, stopping parser");
                            return;
                        }
                    }
                    if parser.is_halted() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Provider stream failed mid-round");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }

        for event in parser.finish() {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }
    });

    rx
}
