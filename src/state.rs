//! The behavior interface implemented by every state.

use std::sync::Arc;

use crate::machine::Machine;
use crate::message::Message;

/// Shared handle to a state.
///
/// States are identified by reference, not by value: registering, activation
/// checks, and transition targets all compare with [`Arc::ptr_eq`]. Hosts
/// keep one `StateRef` per state for the machine's lifetime and pass clones
/// of it to the configuration and runtime surfaces.
pub type StateRef<C> = Arc<dyn State<C>>;

/// Outcome of offering a message to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Status {
    /// The state consumed the message; no ancestor sees it.
    Handled,
    /// The state declined; the message is offered to the parent next.
    Unhandled,
}

/// A behavior unit in the state hierarchy.
///
/// States hold no mutable data of their own; anything they need to read or
/// write lives in the machine's context (`machine.context`). The three hooks
/// run on the machine's worker and receive the worker-side [`Machine`], so
/// they may transition, send, or defer without any synchronization.
///
/// # Example
///
/// ```rust
/// use tokio_hsm::{Machine, Message, State, Status};
///
/// struct Ctx { retries: u32 }
/// struct Connecting;
///
/// const RETRY: u32 = 1;
///
/// impl State<Ctx> for Connecting {
///     fn name(&self) -> &'static str {
///         "Connecting"
///     }
///
///     fn handle(&self, machine: &mut Machine<Ctx>, msg: &Message) -> Status {
///         match msg.what {
///             RETRY => {
///                 machine.context.retries += 1;
///                 Status::Handled
///             }
///             _ => Status::Unhandled,
///         }
///     }
/// }
/// ```
pub trait State<C>: Send + Sync {
    /// Stable diagnostic name for this state.
    fn name(&self) -> &'static str;

    /// Called when this state becomes active, after its parent's `enter`.
    fn enter(&self, machine: &mut Machine<C>) {
        let _ = machine;
    }

    /// Called when this state stops being active, before its parent's `exit`.
    fn exit(&self, machine: &mut Machine<C>) {
        let _ = machine;
    }

    /// Offers a message to this state.
    ///
    /// Returning [`Status::Unhandled`] passes the message on to the parent
    /// state; returning [`Status::Handled`] stops the walk. The default
    /// declines everything.
    fn handle(&self, machine: &mut Machine<C>, msg: &Message) -> Status {
        let _ = (machine, msg);
        Status::Unhandled
    }
}
