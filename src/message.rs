//! Messages processed by the state machine worker.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A unit of work delivered to the active state stack.
///
/// A message carries an opaque discriminator (`what`), two integer arguments,
/// and an optional shared object payload. The discriminator is the message's
/// identity for pending/deferred matching: [`Machine::remove_pending`] and
/// [`Machine::remove_deferred`] match on `what` alone.
///
/// Messages are cheap to clone; the object payload is reference-counted.
///
/// # Example
///
/// ```rust
/// use tokio_hsm::Message;
///
/// const CONNECT: u32 = 3;
///
/// let msg = Message::new(CONNECT).with_arg1(42).with_obj("peer-a".to_string());
/// assert_eq!(msg.what, CONNECT);
/// assert_eq!(msg.arg1, 42);
/// assert_eq!(msg.obj::<String>().as_deref(), Some(&"peer-a".to_string()));
/// ```
///
/// [`Machine::remove_pending`]: crate::Machine::remove_pending
/// [`Machine::remove_deferred`]: crate::Machine::remove_deferred
#[derive(Clone)]
pub struct Message {
    /// Discriminator identifying what this message is about.
    pub what: u32,
    /// First integer argument, `0` if unused.
    pub arg1: i32,
    /// Second integer argument, `0` if unused.
    pub arg2: i32,
    obj: Option<Arc<dyn Any + Send + Sync>>,
}

impl Message {
    /// Creates a message with the given discriminator and no payload.
    #[must_use]
    pub fn new(what: u32) -> Self {
        Self {
            what,
            arg1: 0,
            arg2: 0,
            obj: None,
        }
    }

    /// Sets the first integer argument.
    #[must_use]
    pub fn with_arg1(mut self, arg1: i32) -> Self {
        self.arg1 = arg1;
        self
    }

    /// Sets the second integer argument.
    #[must_use]
    pub fn with_arg2(mut self, arg2: i32) -> Self {
        self.arg2 = arg2;
        self
    }

    /// Attaches an object payload.
    #[must_use]
    pub fn with_obj<T: Any + Send + Sync>(mut self, obj: T) -> Self {
        self.obj = Some(Arc::new(obj));
        self
    }

    /// Returns the object payload downcast to `T`, if present and of that type.
    #[must_use]
    pub fn obj<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.obj.clone().and_then(|obj| obj.downcast::<T>().ok())
    }

    /// Returns `true` if an object payload is attached.
    #[must_use]
    pub fn has_obj(&self) -> bool {
        self.obj.is_some()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("what", &self.what)
            .field("arg1", &self.arg1)
            .field("arg2", &self.arg2)
            .field("obj", &self.obj.is_some())
            .finish()
    }
}

impl From<u32> for Message {
    fn from(what: u32) -> Self {
        Self::new(what)
    }
}
