//! # tokio-hsm
//!
//! Hierarchical state machine engine on Tokio: nested states share behavior
//! through parent fallback, all messages are processed by one serialized
//! worker, and transitions run exit/enter hooks in statechart order via the
//! nearest common active ancestor.
//!
//! The engine provides:
//!
//! - a state hierarchy registry and an active-state stack (leaf to root),
//! - transitions that exit bottom-up and enter top-down, never touching the
//!   common ancestor,
//! - a serialized message queue with deferred-message reinjection and
//!   delayed, cancelable delivery,
//! - a cross-thread query bridge for consistent snapshots of the worker's
//!   state between two dispatch cycles.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tokio_hsm::{HsmError, Machine, Message, State, StateMachine, StateRef, Status};
//!
//! const PING: u32 = 1;
//!
//! struct Ctx {
//!     pings: u32,
//! }
//!
//! struct Root;
//!
//! impl State<Ctx> for Root {
//!     fn name(&self) -> &'static str {
//!         "Root"
//!     }
//!
//!     fn handle(&self, machine: &mut Machine<Ctx>, msg: &Message) -> Status {
//!         match msg.what {
//!             PING => {
//!                 machine.context.pings += 1;
//!                 Status::Handled
//!             }
//!             _ => Status::Unhandled,
//!         }
//!     }
//! }
//!
//! fn main() -> Result<(), HsmError> {
//!     let root: StateRef<Ctx> = Arc::new(Root);
//!
//!     let mut sm = StateMachine::new(Ctx { pings: 0 });
//!     sm.register(root.clone(), None)?;
//!     sm.set_initial_state(&root);
//!
//!     let handle = sm.start()?;
//!     handle.send(Message::new(PING))?;
//!     assert_eq!(handle.blocking_current_state()?.name(), "Root");
//!     Ok(())
//! }
//! ```

mod error;
mod hierarchy;
mod machine;
mod message;
mod observer;
mod state;
mod timer;
mod worker;

pub use crate::error::HsmError;
pub use crate::machine::{Machine, StateMachine};
pub use crate::message::Message;
pub use crate::observer::Observer;
pub use crate::state::{State, StateRef, Status};
pub use crate::worker::MachineHandle;
