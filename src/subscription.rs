//! Removal handles for registered callbacks.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Handle returned by every registration call.
///
/// [`unsubscribe`](Self::unsubscribe) removes the registration; calling it
/// again is a no-op. Dropping the handle does **not** unsubscribe, so a
/// registration made for the lifetime of the router can simply ignore it.
/// Clones share the same registration.
#[derive(Clone)]
pub struct Subscription {
    cancel: Arc<Mutex<Option<Unsubscribe>>>,
}

impl Subscription {
    /// Wrap the function that undoes a registration.
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Arc::new(Mutex::new(Some(Box::new(unsubscribe)))),
        }
    }

    /// A handle with nothing to remove.
    pub fn noop() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    /// Remove the registration. Idempotent.
    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Check if the registration is still in place.
    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
