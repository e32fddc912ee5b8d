//! Diagnostic hooks for enter/exit/dispatch events.

use crate::message::Message;

/// Observational callbacks invoked by the worker around state lifecycle
/// events. Purely diagnostic: implementations must not assume they can
/// affect control flow, because they cannot.
///
/// The defaults emit `tracing` events, so a host that only wants logs can
/// install a subscriber and leave this trait alone. Override to feed custom
/// diagnostics.
pub trait Observer: Send {
    /// A state's `enter` hook is about to run.
    fn on_enter(&mut self, state: &str) {
        tracing::debug!(state, "enter");
    }

    /// A state's `exit` hook is about to run.
    fn on_exit(&mut self, state: &str) {
        tracing::debug!(state, "exit");
    }

    /// A message is about to be offered to `state`.
    fn on_message(&mut self, state: &str, msg: &Message) {
        tracing::trace!(state, what = msg.what, "process message");
    }
}

/// Default observer: tracing output only.
pub(crate) struct TraceObserver;

impl Observer for TraceObserver {}
