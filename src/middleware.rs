//! Route middleware for cross-cutting navigation concerns.
//!
//! Middleware is attached per route when the route table is declared. For a
//! matched route, the middleware of every node in the chain is collected
//! root to leaf and composed into one [`MiddlewareChain`], onion style:
//! code before `next.proceed(ctx).await` runs on the way in, code after it
//! runs on the way out.
//!
//! Each middleware must resolve its [`Next`] handle **exactly once**:
//!
//! | Call | Effect |
//! |------|--------|
//! | [`Next::proceed`] | run the rest of the chain |
//! | [`Next::cancel`] | stop the chain, cancel the navigation |
//! | [`Next::redirect`] | stop the chain, navigate elsewhere instead |
//!
//! A second call on the same handle fails with
//! [`RouterError::NextCalledTwice`] and the whole chain rejects. A chain
//! that finishes without anybody reaching the end or signalling cancel or
//! redirect is treated as cancelled.
//!
//! # Example
//!
//! ```
//! use futures::future::BoxFuture;
//! use waymark::{Middleware, MiddlewareContext, Next};
//!
//! struct RequireLocale;
//!
//! impl Middleware for RequireLocale {
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             if ctx.query.contains("lang") {
//!                 next.proceed(ctx).await
//!             } else {
//!                 next.redirect(format!("{}?lang=en", ctx.to.path)).await
//!             }
//!         })
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "RequireLocale"
//!     }
//! }
//! ```

use crate::error::RouterError;
use crate::lifecycle::NavigationAction;
use crate::location::Location;
use crate::params::{QueryParams, RouteParams};
use crate::route::Meta;
use crate::{trace_log, warn_log};
use futures::future::{self, BoxFuture};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Middleware trait
// ============================================================================

/// A step in a route's middleware chain.
pub trait Middleware: Send + Sync + 'static {
    /// Run this step. Resolve `next` exactly once.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Middleware name for diagnostics.
    fn name(&self) -> &'static str {
        "Middleware"
    }
}

/// Create middleware from a closure.
///
/// The closure must return a boxed future, which is what `Box::pin(async
/// move { .. })` produces:
///
/// ```
/// use waymark::middleware_fn;
///
/// let passthrough = middleware_fn(|ctx, next| Box::pin(async move { next.proceed(ctx).await }));
/// ```
pub fn middleware_fn<F>(handler: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Next<'a>) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware {
        handler,
        name: "FnMiddleware",
    }
}

/// Middleware created from a closure via [`middleware_fn`].
pub struct FnMiddleware<F> {
    handler: F,
    name: &'static str,
}

impl<F> FnMiddleware<F> {
    /// Give this middleware a diagnostic name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Next<'a>) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.handler)(ctx, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// ============================================================================
// MiddlewareContext
// ============================================================================

type Redirector = Arc<dyn Fn(&str) + Send + Sync>;

/// Mutable context shared by every middleware of one chain run.
pub struct MiddlewareContext {
    /// Target location.
    pub to: Location,
    /// Location being left.
    pub from: Location,
    /// Parameters merged across the matched chain.
    pub params: RouteParams,
    /// Decoded query of `to`.
    pub query: QueryParams,
    /// Decoded fragment parameters of `to`.
    pub fragment_params: QueryParams,
    /// Meta of the matched leaf route.
    pub meta: Meta,
    /// Free-form bag for passing data between middleware.
    pub state: HashMap<String, Value>,
    redirector: Option<Redirector>,
}

impl MiddlewareContext {
    pub fn new(to: Location, from: Location) -> Self {
        let query = to.query_params();
        let fragment_params = to.fragment_params();
        Self {
            to,
            from,
            params: RouteParams::new(),
            query,
            fragment_params,
            meta: Meta::new(),
            state: HashMap::new(),
            redirector: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: RouteParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Install the handler used by [`redirect`](Self::redirect).
    #[must_use]
    pub fn with_redirector(mut self, redirector: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.redirector = Some(Arc::new(redirector));
        self
    }

    /// Rewrite the address right away and notify location subscribers.
    ///
    /// This does not touch the chain: the middleware still has to resolve
    /// its [`Next`]. Use [`Next::redirect`] to abandon the navigation instead.
    pub fn redirect(&self, path: &str) {
        match &self.redirector {
            Some(redirector) => redirector(path),
            None => warn_log!("middleware redirect to '{}' ignored: no redirect handler", path),
        }
    }
}

impl fmt::Debug for MiddlewareContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("params", &self.params)
            .field("state", &self.state)
            .finish()
    }
}

// ============================================================================
// Next / dispatch
// ============================================================================

/// Continuation handed to a middleware.
pub struct Next<'a> {
    position: usize,
    dispatcher: &'a Dispatcher,
}

impl<'a> Next<'a> {
    /// Run the remaining middleware.
    pub fn proceed<'b>(&'b self, ctx: &'b mut MiddlewareContext) -> BoxFuture<'b, anyhow::Result<()>> {
        self.dispatcher.dispatch(self.position, ctx)
    }

    /// Stop the chain and cancel the navigation.
    pub fn cancel(&self) -> BoxFuture<'static, anyhow::Result<()>> {
        let result = self
            .dispatcher
            .terminate(self.position, NavigationAction::deny("cancelled by middleware"));
        Box::pin(future::ready(result))
    }

    /// Stop the chain and start a new navigation at `path`.
    pub fn redirect(&self, path: impl Into<String>) -> BoxFuture<'static, anyhow::Result<()>> {
        let result = self
            .dispatcher
            .terminate(self.position, NavigationAction::redirect(path));
        Box::pin(future::ready(result))
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .finish()
    }
}

/// Bookkeeping for one chain run.
///
/// `cursor` is the next position allowed to dispatch. Every continuation
/// call advances it by exactly one, so a stale handle always fails.
struct Dispatcher {
    middlewares: Vec<Arc<dyn Middleware>>,
    cursor: AtomicUsize,
    violated: AtomicBool,
    outcome: Mutex<Option<NavigationAction>>,
    failed: Mutex<Option<&'static str>>,
}

impl Dispatcher {
    fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middlewares,
            cursor: AtomicUsize::new(0),
            violated: AtomicBool::new(false),
            outcome: Mutex::new(None),
            failed: Mutex::new(None),
        }
    }

    fn advance(&self, position: usize) -> Result<(), RouterError> {
        self.cursor
            .compare_exchange(position, position + 1, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| {
                self.violated.store(true, Ordering::SeqCst);
                RouterError::NextCalledTwice
            })
    }

    fn dispatch<'b>(
        &'b self,
        position: usize,
        ctx: &'b mut MiddlewareContext,
    ) -> BoxFuture<'b, anyhow::Result<()>> {
        if let Err(err) = self.advance(position) {
            return Box::pin(future::ready(Err(err.into())));
        }

        let Some(middleware) = self.middlewares.get(position) else {
            self.settle(NavigationAction::Continue);
            return Box::pin(future::ready(Ok(())));
        };

        trace_log!("middleware dispatch index {} ({})", position, middleware.name());
        let next = Next {
            position: position + 1,
            dispatcher: self,
        };

        Box::pin(async move {
            let result = middleware.handle(ctx, next).await;
            if result.is_err() {
                self.failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(middleware.name());
            }
            result
        })
    }

    fn terminate(&self, position: usize, action: NavigationAction) -> anyhow::Result<()> {
        self.advance(position)?;
        self.settle(action);
        Ok(())
    }

    fn settle(&self, action: NavigationAction) {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(action);
    }

    fn take_outcome(&self) -> Option<NavigationAction> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn failed_name(&self) -> &'static str {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or("Middleware")
    }
}

// ============================================================================
// MiddlewareChain
// ============================================================================

/// An ordered list of middleware composed into a single executor.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain and report how it ended.
    ///
    /// `Ok(Continue)` means the end of the chain was reached. `Deny` and
    /// `Redirect` come from a middleware short-circuiting. A protocol
    /// violation or a middleware's own failure is an `Err`.
    pub async fn run(&self, ctx: &mut MiddlewareContext) -> Result<NavigationAction, RouterError> {
        if self.middlewares.is_empty() {
            return Ok(NavigationAction::Continue);
        }

        let dispatcher = Dispatcher::new(self.middlewares.clone());
        let result = dispatcher.dispatch(0, ctx).await;

        if dispatcher.violated.load(Ordering::SeqCst) {
            return Err(RouterError::NextCalledTwice);
        }

        if let Err(err) = result {
            return Err(match err.downcast::<RouterError>() {
                Ok(router_err) => router_err,
                Err(other) => RouterError::Middleware {
                    name: dispatcher.failed_name(),
                    source: other.into(),
                },
            });
        }

        match dispatcher.take_outcome() {
            Some(action) => Ok(action),
            None => {
                warn_log!(
                    "middleware chain for '{}' finished without calling next(); cancelling",
                    ctx.to.path
                );
                Ok(NavigationAction::deny("middleware chain did not call next()"))
            }
        }
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.middlewares.iter().map(|m| m.name()).collect();
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &names)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
