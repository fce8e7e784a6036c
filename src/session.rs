//! The active router registry.
//!
//! Code that has no handle to the router (a deep helper, a link handler)
//! can still navigate through the free functions here, as long as some
//! router has been activated. Activation is explicit and scoped:
//!
//! ```
//! use std::sync::Arc;
//! use waymark::{session, MemoryHistory, NavigateOptions, Route, Router};
//!
//! let router = Router::builder(
//!     vec![Route::new("/", "Home"), Route::new("/about", "About")],
//!     Arc::new(MemoryHistory::new("/")),
//! )
//! .build()
//! .unwrap();
//!
//! let active = router.activate();
//! pollster::block_on(session::navigate("/about", NavigateOptions::default())).unwrap();
//! assert_eq!(router.location().path, "/about");
//!
//! active.end();
//! assert!(!session::is_active());
//! ```
//!
//! Activating another router replaces the previous one. Ending a session
//! that was already replaced leaves the newer one in place.

use crate::error::{NavigationResult, RouterError};
use crate::location::Location;
use crate::router::{NavigateOptions, NavigationTarget, Router};
use crate::{debug_log, warn_log};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Type-erased view of a router, independent of its component type.
trait ActiveRouter: Send + Sync {
    fn navigate_boxed(
        &self,
        target: NavigationTarget,
        options: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationResult, RouterError>>;

    fn location(&self) -> Location;
}

impl<C: Send + Sync + 'static> ActiveRouter for Router<C> {
    fn navigate_boxed(
        &self,
        target: NavigationTarget,
        options: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationResult, RouterError>> {
        let router = self.clone();
        Box::pin(async move { router.navigate(target, options).await })
    }

    fn location(&self) -> Location {
        Router::location(self)
    }
}

struct Active {
    id: u64,
    router: Arc<dyn ActiveRouter>,
}

static ACTIVE: RwLock<Option<Active>> = RwLock::new(None);
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

fn current() -> Option<Arc<dyn ActiveRouter>> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(|active| Arc::clone(&active.router))
}

/// Keeps a router registered as the active one until dropped or ended.
#[must_use = "dropping the session deactivates the router"]
#[derive(Debug)]
pub struct Session {
    id: u64,
}

impl Session {
    /// Check if this session still owns the registry.
    pub fn is_current(&self) -> bool {
        ACTIVE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|active| active.id == self.id)
    }

    /// Deactivate now. Same as dropping the session.
    pub fn end(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut slot = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
            debug_log!("session #{} ended", self.id);
        }
    }
}

impl<C: Send + Sync + 'static> Router<C> {
    /// Register this router as the target of [`session::navigate`](navigate)
    /// and [`session::back`](back).
    pub fn activate(&self) -> Session {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let previous = ACTIVE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Active {
                id,
                router: Arc::new(self.clone()),
            });
        match previous {
            Some(previous) => debug_log!("session #{} replaced session #{}", id, previous.id),
            None => debug_log!("session #{} started", id),
        }
        Session { id }
    }
}

/// Check if a router is active.
pub fn is_active() -> bool {
    current().is_some()
}

/// Location of the active router.
pub fn location() -> Option<Location> {
    current().map(|router| router.location())
}

/// Navigate the active router.
pub async fn navigate(
    target: impl Into<NavigationTarget>,
    options: NavigateOptions,
) -> Result<NavigationResult, RouterError> {
    let target = target.into();
    let Some(router) = current() else {
        warn_log!("navigation to {:?} requested with no active router", target);
        return Err(RouterError::NoActiveRouter);
    };
    router.navigate_boxed(target, options).await
}

/// Go back one entry on the active router.
pub async fn back() -> Result<NavigationResult, RouterError> {
    navigate(NavigationTarget::Delta(-1), NavigateOptions::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::route::Route;
    use pollster::block_on;

    fn router() -> Router<&'static str> {
        Router::builder(
            vec![Route::new("/", "Home"), Route::new("/about", "About")],
            Arc::new(MemoryHistory::new("/")),
        )
        .build()
        .unwrap()
    }

    // The registry is process-wide, so the whole lifecycle lives in one test.
    #[test]
    fn test_session_lifecycle() {
        assert!(!is_active());
        let err = block_on(navigate("/about", NavigateOptions::default())).unwrap_err();
        assert!(matches!(err, RouterError::NoActiveRouter));

        let first = router();
        let first_session = first.activate();
        assert!(first_session.is_current());
        block_on(navigate("/about", NavigateOptions::default())).unwrap();
        assert_eq!(first.location().path, "/about");
        assert_eq!(location().map(|l| l.path), Some("/about".to_string()));

        let back_result = block_on(back()).unwrap();
        assert!(back_result.is_committed());
        assert_eq!(first.location().path, "/");

        let second = router();
        let second_session = second.activate();
        assert!(!first_session.is_current());

        // Ending a replaced session leaves the newer one active.
        first_session.end();
        assert!(second_session.is_current());
        block_on(navigate("/about", NavigateOptions::default())).unwrap();
        assert_eq!(second.location().path, "/about");
        assert_eq!(first.location().path, "/");

        drop(second_session);
        assert!(!is_active());
        assert!(location().is_none());
    }
}
