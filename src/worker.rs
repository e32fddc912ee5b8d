//! The single-consumer worker loop and the cross-thread handle.
//!
//! All engine state is owned by one driver task. External callers talk to
//! it through [`MachineHandle`]: fire-and-forget operations are posted onto
//! the command channel, queries are a round-trip over a oneshot reply
//! channel. Commands are only ever acted on between two dispatch cycles, so
//! a foreign reader can never observe a stack mid-transition.

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::HsmError;
use crate::machine::Machine;
use crate::message::Message;
use crate::state::StateRef;

pub(crate) enum Command<C> {
    Send(Message),
    SendDelayed(Message, Instant),
    RemovePending(u32),
    RemoveDeferred(u32),
    Query(Query<C>),
}

pub(crate) enum Query<C> {
    CurrentState(oneshot::Sender<StateRef<C>>),
    CurrentMessage(oneshot::Sender<Option<Message>>),
    IsActive(StateRef<C>, oneshot::Sender<bool>),
    HasPending(u32, oneshot::Sender<bool>),
}

pub(crate) struct Driver<C> {
    pub(crate) core: Machine<C>,
    pub(crate) rx: mpsc::UnboundedReceiver<Command<C>>,
    pub(crate) initial: StateRef<C>,
}

impl<C> Driver<C> {
    pub(crate) async fn run(mut self) {
        let initial = self.initial.clone();
        self.core.perform_transitions(&initial);

        loop {
            self.core.deliver_due(Instant::now());
            while let Ok(cmd) = self.rx.try_recv() {
                self.accept(cmd);
            }
            if let Some(msg) = self.core.next_queued() {
                self.core.process(msg);
                continue;
            }

            // Idle: wait for the next command or the next timer deadline.
            let deadline = self.core.next_deadline();
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.accept(cmd),
                    None => break,
                },
                () = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {}
            }
        }
        tracing::debug!("all handles dropped, worker stopping");
    }

    fn accept(&mut self, cmd: Command<C>) {
        match cmd {
            Command::Send(msg) => self.core.send(msg),
            Command::SendDelayed(msg, deadline) => self.core.schedule(deadline, msg),
            Command::RemovePending(what) => self.core.remove_pending(what),
            Command::RemoveDeferred(what) => self.core.remove_deferred(what),
            Command::Query(query) => self.answer(query),
        }
    }

    fn answer(&mut self, query: Query<C>) {
        match query {
            Query::CurrentState(tx) => {
                // The initial transition runs before any command is drained,
                // so a leaf always exists here.
                if let Some(state) = self.core.current_state() {
                    let _ = tx.send(state);
                }
            }
            Query::CurrentMessage(tx) => {
                let _ = tx.send(self.core.current_message().cloned());
            }
            Query::IsActive(state, tx) => {
                let _ = tx.send(self.core.is_active(&state));
            }
            Query::HasPending(what, tx) => {
                let _ = tx.send(self.core.has_pending(what));
            }
        }
    }
}

/// Cloneable handle to a running state machine.
///
/// Safe to use from any thread. Sends and removals are non-blocking posts
/// onto the worker's queue. Queries are round-trips: the worker computes the
/// answer between two dispatch cycles and hands it back. Each query exists
/// in an `async` form and a `blocking_` form for plain threads; the
/// blocking forms must not be called from async context.
///
/// Queries block for as long as the worker is alive but busy; there is no
/// timeout. A worker that is gone (every handle dropped elsewhere, or its
/// task aborted) fails all operations with [`HsmError::Closed`] immediately.
pub struct MachineHandle<C> {
    tx: mpsc::UnboundedSender<Command<C>>,
}

impl<C> Clone for MachineHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> fmt::Debug for MachineHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineHandle").finish_non_exhaustive()
    }
}

impl<C> MachineHandle<C> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command<C>>) -> Self {
        Self { tx }
    }

    fn post(&self, cmd: Command<C>) -> Result<(), HsmError> {
        self.tx.send(cmd).map_err(|_| HsmError::Closed)
    }

    fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Query<C>,
    ) -> Result<oneshot::Receiver<T>, HsmError> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Query(make(tx)))?;
        Ok(rx)
    }

    /// Enqueues a message at the tail of the machine's queue.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub fn send(&self, msg: impl Into<Message>) -> Result<(), HsmError> {
        self.post(Command::Send(msg.into()))
    }

    /// Schedules a message for delivery no earlier than `delay` from now.
    ///
    /// Delivery order across delayed messages follows their deadlines, not
    /// their submission order. The message stays cancelable via
    /// [`remove_pending`](MachineHandle::remove_pending) until delivered.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub fn send_delayed(&self, msg: impl Into<Message>, delay: Duration) -> Result<(), HsmError> {
        self.post(Command::SendDelayed(msg.into(), Instant::now() + delay))
    }

    /// Cancels every queued or scheduled message with this `what`.
    ///
    /// Canceling after delivery is a no-op.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub fn remove_pending(&self, what: u32) -> Result<(), HsmError> {
        self.post(Command::RemovePending(what))
    }

    /// Drops deferred messages with this `what` before they are flushed.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub fn remove_deferred(&self, what: u32) -> Result<(), HsmError> {
        self.post(Command::RemoveDeferred(what))
    }

    /// Most specific currently active state.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub async fn current_state(&self) -> Result<StateRef<C>, HsmError> {
        let rx = self.query(Query::CurrentState)?;
        rx.await.map_err(|_| HsmError::Closed)
    }

    /// Blocking form of [`current_state`](MachineHandle::current_state).
    pub fn blocking_current_state(&self) -> Result<StateRef<C>, HsmError> {
        let rx = self.query(Query::CurrentState)?;
        rx.blocking_recv().map_err(|_| HsmError::Closed)
    }

    /// The message most recently dispatched, if any.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub async fn current_message(&self) -> Result<Option<Message>, HsmError> {
        let rx = self.query(Query::CurrentMessage)?;
        rx.await.map_err(|_| HsmError::Closed)
    }

    /// Blocking form of [`current_message`](MachineHandle::current_message).
    pub fn blocking_current_message(&self) -> Result<Option<Message>, HsmError> {
        let rx = self.query(Query::CurrentMessage)?;
        rx.blocking_recv().map_err(|_| HsmError::Closed)
    }

    /// Returns `true` if `state` is anywhere on the active stack.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub async fn is_active(&self, state: &StateRef<C>) -> Result<bool, HsmError> {
        let state = state.clone();
        let rx = self.query(move |tx| Query::IsActive(state, tx))?;
        rx.await.map_err(|_| HsmError::Closed)
    }

    /// Blocking form of [`is_active`](MachineHandle::is_active).
    pub fn blocking_is_active(&self, state: &StateRef<C>) -> Result<bool, HsmError> {
        let state = state.clone();
        let rx = self.query(move |tx| Query::IsActive(state, tx))?;
        rx.blocking_recv().map_err(|_| HsmError::Closed)
    }

    /// Returns `true` if a message with this `what` is queued or scheduled
    /// but not yet dispatched.
    ///
    /// # Errors
    ///
    /// [`HsmError::Closed`] if the worker is gone.
    pub async fn has_pending(&self, what: u32) -> Result<bool, HsmError> {
        let rx = self.query(move |tx| Query::HasPending(what, tx))?;
        rx.await.map_err(|_| HsmError::Closed)
    }

    /// Blocking form of [`has_pending`](MachineHandle::has_pending).
    pub fn blocking_has_pending(&self, what: u32) -> Result<bool, HsmError> {
        let rx = self.query(move |tx| Query::HasPending(what, tx))?;
        rx.blocking_recv().map_err(|_| HsmError::Closed)
    }
}
