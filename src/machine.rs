//! The machine core and its configuration surface.
//!
//! [`StateMachine`] is the pre-start configuration object: register states,
//! pick the initial one, then `start()` hands the whole core to a dedicated
//! worker and returns a [`MachineHandle`]. [`Machine`] is the worker-side
//! owner that state hooks receive; everything it touches is owned by the
//! single worker, so hooks mutate freely without synchronization.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::HsmError;
use crate::hierarchy::Hierarchy;
use crate::message::Message;
use crate::observer::{Observer, TraceObserver};
use crate::state::{StateRef, Status};
use crate::timer::TimerQueue;
use crate::worker::{Driver, MachineHandle};

/// Worker-side state machine core.
///
/// Passed by `&mut` to every state hook. The embedded user context is a
/// public field, so handlers read and write it directly:
///
/// ```ignore
/// fn handle(&self, machine: &mut Machine<Ctx>, msg: &Message) -> Status {
///     machine.context.attempts += 1;
///     machine.send_delayed(Message::new(RETRY), Duration::from_millis(500));
///     Status::Handled
/// }
/// ```
pub struct Machine<C> {
    /// Host-owned data shared by all states of this machine.
    pub context: C,
    hierarchy: Hierarchy<C>,
    queue: VecDeque<Message>,
    deferred: Vec<Message>,
    timers: TimerQueue,
    pending_dest: Option<StateRef<C>>,
    current: Option<Message>,
    observer: Box<dyn Observer>,
}

impl<C> Machine<C> {
    fn new(context: C) -> Self {
        Self {
            context,
            hierarchy: Hierarchy::new(),
            queue: VecDeque::new(),
            deferred: Vec::new(),
            timers: TimerQueue::new(),
            pending_dest: None,
            current: None,
            observer: Box::new(TraceObserver),
        }
    }

    /// Records `state` as the destination for the pending transition.
    ///
    /// Only meaningful from within a state hook during dispatch. The
    /// transition is applied after the current message has finished being
    /// offered to the active stack; calling this again before then simply
    /// overwrites the destination, so the last call wins.
    ///
    /// # Panics
    ///
    /// Applying the transition panics if `state` was never registered.
    pub fn transition_to(&mut self, state: &StateRef<C>) {
        self.pending_dest = Some(state.clone());
    }

    /// Enqueues a message at the tail of the machine's queue.
    pub fn send(&mut self, msg: impl Into<Message>) {
        self.queue.push_back(msg.into());
    }

    /// Schedules a message for delivery no earlier than `delay` from now.
    pub fn send_delayed(&mut self, msg: impl Into<Message>, delay: Duration) {
        self.timers.insert(Instant::now() + delay, msg.into());
    }

    /// Returns `true` if a message with this `what` is queued or scheduled
    /// but not yet dispatched.
    #[must_use]
    pub fn has_pending(&self, what: u32) -> bool {
        self.queue.iter().any(|msg| msg.what == what) || self.timers.contains(what)
    }

    /// Cancels every queued or scheduled message with this `what`.
    ///
    /// Typically called from an `exit` hook so a stale timeout cannot fire
    /// after the state that armed it has been left. Messages already
    /// dispatched are unaffected.
    pub fn remove_pending(&mut self, what: u32) {
        self.queue.retain(|msg| msg.what != what);
        self.timers.remove_matching(what);
    }

    /// Sets a message aside until the next transition completes.
    ///
    /// Deferred messages are reinserted at the head of the queue, in the
    /// order they were deferred, when a transition is applied. Without a
    /// transition they stay buffered indefinitely.
    pub fn defer(&mut self, msg: Message) {
        self.deferred.push(msg);
    }

    /// Drops deferred messages with this `what` before they are flushed.
    pub fn remove_deferred(&mut self, what: u32) {
        self.deferred.retain(|msg| msg.what != what);
    }

    /// Most specific currently active state.
    ///
    /// `None` only while the very first enter chain is still running, since
    /// no leaf has been pushed yet; after `start()` completes the stack is
    /// never empty.
    #[must_use]
    pub fn current_state(&self) -> Option<StateRef<C>> {
        self.hierarchy.leaf()
    }

    /// The message most recently dispatched, if any.
    #[must_use]
    pub fn current_message(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// Returns `true` if `state` is anywhere on the active stack.
    #[must_use]
    pub fn is_active(&self, state: &StateRef<C>) -> bool {
        self.hierarchy.is_active(state)
    }

    /// Moves due delayed messages onto the queue tail, in deadline order.
    pub(crate) fn deliver_due(&mut self, now: Instant) {
        while let Some(msg) = self.timers.pop_due(now) {
            self.queue.push_back(msg);
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub(crate) fn schedule(&mut self, deadline: Instant, msg: Message) {
        self.timers.insert(deadline, msg);
    }

    pub(crate) fn next_queued(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Runs one dispatch cycle: offer the message to the active stack, then
    /// apply the pending transition if a handler requested one.
    pub(crate) fn process(&mut self, msg: Message) {
        self.current = Some(msg.clone());
        let mut handled = false;
        for state in self.hierarchy.active_states() {
            self.observer.on_message(state.name(), &msg);
            if state.handle(self, &msg) == Status::Handled {
                handled = true;
                break;
            }
        }
        if !handled {
            tracing::debug!(what = msg.what, "message unhandled by any active state, dropped");
        }
        if let Some(dest) = self.pending_dest.clone() {
            self.perform_transitions(&dest);
            self.pending_dest = None;
        }
    }

    /// Applies a transition to `dest`: exit up to the nearest common active
    /// ancestor (most specific first), enter down to the destination
    /// (ancestor first), then flush the deferred buffer to the queue head.
    pub(crate) fn perform_transitions(&mut self, dest: &StateRef<C>) {
        let Some(dest_idx) = self.hierarchy.index_of(dest) else {
            panic!("transition target `{}` is not registered", dest.name());
        };
        tracing::trace!(dest = dest.name(), "transition");
        let plan = self.hierarchy.plan(dest_idx);

        while let Some(front) = self.hierarchy.stack_front() {
            if Some(front) == plan.common {
                break;
            }
            let state = self.hierarchy.state(front);
            self.observer.on_exit(state.name());
            state.exit(self);
            self.hierarchy.deactivate_front();
        }

        for &idx in &plan.enter {
            let state = self.hierarchy.state(idx);
            self.observer.on_enter(state.name());
            state.enter(self);
            self.hierarchy.activate(idx);
        }

        self.flush_deferred();
    }

    fn flush_deferred(&mut self) {
        for msg in self.deferred.drain(..).rev() {
            self.queue.push_front(msg);
        }
    }
}

/// Pre-start configuration surface.
///
/// Build the hierarchy, pick the initial state, then [`start`] (owned
/// worker thread) or [`start_on`] (caller-provided Tokio runtime) consumes
/// the machine and returns the cloneable runtime handle. Configuration is
/// serialized by ownership: it happens on whichever thread owns this value,
/// strictly before the worker exists.
///
/// [`start`]: StateMachine::start
/// [`start_on`]: StateMachine::start_on
pub struct StateMachine<C> {
    core: Machine<C>,
    initial: Option<StateRef<C>>,
}

impl<C> StateMachine<C> {
    /// Creates a machine owning `context`.
    pub fn new(context: C) -> Self {
        Self {
            core: Machine::new(context),
            initial: None,
        }
    }

    /// Registers `state` with an optional parent.
    ///
    /// If the parent was never registered it is registered first, as a root;
    /// later registering that parent again is a duplicate. Cycles are not
    /// detected — the caller must not introduce one.
    ///
    /// # Errors
    ///
    /// [`HsmError::DuplicateState`] if `state` was already registered,
    /// regardless of the parent argument.
    pub fn register(
        &mut self,
        state: StateRef<C>,
        parent: Option<&StateRef<C>>,
    ) -> Result<(), HsmError> {
        self.core.hierarchy.register(state, parent).map(|_| ())
    }

    /// Selects the state the machine enters when started.
    pub fn set_initial_state(&mut self, state: &StateRef<C>) {
        self.initial = Some(state.clone());
    }

    /// Replaces the default tracing-backed diagnostic observer.
    pub fn set_observer(&mut self, observer: Box<dyn Observer>) {
        self.core.observer = observer;
    }

    fn into_driver(self) -> Result<(Driver<C>, MachineHandle<C>), HsmError> {
        let initial = self.initial.ok_or(HsmError::MissingInitialState)?;
        if self.core.hierarchy.index_of(&initial).is_none() {
            return Err(HsmError::UnknownState(initial.name()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            core: self.core,
            rx,
            initial,
        };
        Ok((driver, MachineHandle::new(tx)))
    }
}

impl<C: Send + 'static> StateMachine<C> {
    /// Starts the machine on its own dedicated worker thread.
    ///
    /// The thread runs a current-thread Tokio runtime for the machine's
    /// lifetime and performs the initial transition before processing any
    /// message: with nothing active yet, the initial state's full ancestor
    /// chain is entered outermost first. The worker stops, abandoning any
    /// queued, deferred, or delayed messages, once every handle clone has
    /// been dropped.
    ///
    /// # Errors
    ///
    /// [`HsmError::MissingInitialState`] if no initial state was set,
    /// [`HsmError::UnknownState`] if the initial state was never registered,
    /// [`HsmError::Spawn`] if the runtime or thread cannot be created.
    pub fn start(self) -> Result<MachineHandle<C>, HsmError> {
        let (driver, handle) = self.into_driver()?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        // Detached on purpose: the worker lives until every handle is dropped.
        let _ = std::thread::Builder::new()
            .name("tokio-hsm-worker".into())
            .spawn(move || rt.block_on(driver.run()))?;
        Ok(handle)
    }

    /// Starts the machine as a task on a caller-provided runtime.
    ///
    /// The task is the machine's single logical worker; it is never
    /// processed concurrently with itself, so the serialization guarantees
    /// are identical to [`start`](StateMachine::start).
    ///
    /// # Errors
    ///
    /// Same configuration errors as [`start`](StateMachine::start).
    pub fn start_on(self, rt: &tokio::runtime::Handle) -> Result<MachineHandle<C>, HsmError> {
        let (driver, handle) = self.into_driver()?;
        let _ = rt.spawn(driver.run());
        Ok(handle)
    }
}
