use std::io;

/// Errors surfaced by the state machine configuration and handle surfaces.
///
/// Configuration mistakes (duplicate registration, missing initial state)
/// are reported before the worker starts; they indicate a wiring bug and
/// should not be retried. [`HsmError::Closed`] is the only runtime error:
/// the worker is gone, which happens once every handle has been dropped.
#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    /// The state was already registered with this machine.
    #[error("state `{0}` already registered")]
    DuplicateState(&'static str),

    /// The initial state was never registered.
    #[error("state `{0}` is not registered")]
    UnknownState(&'static str),

    /// `start()` was called without a prior `set_initial_state()`.
    #[error("no initial state set")]
    MissingInitialState,

    /// The worker could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),

    /// The worker has terminated; no further messages or queries are possible.
    #[error("state machine worker is gone")]
    Closed,
}
