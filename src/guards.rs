//! Navigation guards.
//!
//! Guards are registered globally on the router, not per route, in three
//! registries:
//!
//! | Registry | Runs | Can stop navigation |
//! |----------|------|---------------------|
//! | pre-navigate | before middleware | yes |
//! | pre-resolve | after middleware, right before commit | yes |
//! | post-navigate | after commit | no |
//!
//! A pre-navigate or pre-resolve guard receives a one-shot [`GuardNext`]
//! token. Consuming it decides the fate of the navigation:
//! [`proceed`](GuardNext::proceed), [`cancel`](GuardNext::cancel) or
//! [`redirect`](GuardNext::redirect). The token is moved on use, so a guard
//! cannot decide twice.
//!
//! Guards run strictly in registration order; guard `i + 1` starts only once
//! guard `i` has finished. The first cancel or redirect ends the sequence.
//!
//! A guard that returns `Err` before deciding cancels the sequence. A guard
//! that finishes without deciding also cancels it, with a warning. Errors are
//! logged and never surface from `navigate`.
//!
//! # Example
//!
//! ```
//! use waymark::{guard_fn, GuardManager};
//!
//! let guards = GuardManager::new();
//! let subscription = guards.register_pre_navigate(guard_fn(|to, _from, next| async move {
//!     if to.location.path.starts_with("/admin") {
//!         next.redirect("/login");
//!     } else {
//!         next.proceed();
//!     }
//!     Ok(())
//! }));
//!
//! assert_eq!(guards.counts(), (1, 0, 0));
//! subscription.unsubscribe();
//! assert_eq!(guards.counts(), (0, 0, 0));
//! ```

use crate::lifecycle::NavigationAction;
use crate::location::Location;
use crate::params::{QueryParams, RouteParams};
use crate::route::Meta;
use crate::subscription::Subscription;
use crate::{debug_log, error_log, trace_log, warn_log};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

// ============================================================================
// GuardContext
// ============================================================================

/// What a guard sees about one end of a navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardContext {
    /// The location itself.
    pub location: Location,
    /// Parameters bound by the matched route chain.
    pub params: RouteParams,
    /// Decoded query.
    pub query: QueryParams,
    /// Decoded fragment parameters.
    pub fragment_params: QueryParams,
    /// Meta of the matched leaf route.
    pub meta: Meta,
    /// Pattern of the matched leaf route, `None` when nothing matched.
    pub route_path: Option<String>,
    /// Name of the matched leaf route, if it has one.
    pub route_name: Option<String>,
}

impl GuardContext {
    /// Context for a location that matched no route.
    pub fn new(location: Location) -> Self {
        let query = location.query_params();
        let fragment_params = location.fragment_params();
        Self {
            location,
            query,
            fragment_params,
            ..Self::default()
        }
    }

    /// Attach the matched route's data.
    #[must_use]
    pub fn with_route(
        mut self,
        path: impl Into<String>,
        name: Option<String>,
        params: RouteParams,
        meta: Meta,
    ) -> Self {
        self.route_path = Some(path.into());
        self.route_name = name;
        self.params = params;
        self.meta = meta;
        self
    }

    /// Shortcut for `location.path`.
    pub fn path(&self) -> &str {
        &self.location.path
    }

    /// Check if a route matched this location.
    pub fn is_matched(&self) -> bool {
        self.route_path.is_some()
    }
}

// ============================================================================
// GuardNext (one-shot decision token)
// ============================================================================

/// Single-use decision token handed to a guard.
pub struct GuardNext {
    sender: oneshot::Sender<NavigationAction>,
    index: usize,
}

impl GuardNext {
    /// Let the navigation continue.
    pub fn proceed(self) {
        self.decide(NavigationAction::Continue);
    }

    /// Cancel the navigation.
    pub fn cancel(self) {
        self.decide(NavigationAction::deny("cancelled by guard"));
    }

    /// Abandon this navigation and navigate to `path` instead.
    pub fn redirect(self, path: impl Into<String>) {
        self.decide(NavigationAction::redirect(path));
    }

    /// Hand over an explicit [`NavigationAction`].
    pub fn decide(self, action: NavigationAction) {
        let index = self.index;
        if self.sender.send(action).is_err() {
            warn_log!(
                "guard at index {} called next() after its sequence resolved; ignoring",
                index
            );
        }
    }
}

impl fmt::Debug for GuardNext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardNext")
            .field("index", &self.index)
            .finish()
    }
}

// ============================================================================
// Guard traits
// ============================================================================

/// A pre-navigate or pre-resolve guard.
///
/// Contexts are passed as `Arc` so the returned future can own them.
pub trait RouteGuard: Send + Sync + 'static {
    /// Inspect the navigation and consume `next` with a decision.
    fn check(
        &self,
        to: Arc<GuardContext>,
        from: Arc<GuardContext>,
        next: GuardNext,
    ) -> BoxFuture<'static, anyhow::Result<()>>;

    /// Guard name for debugging and error messages.
    fn name(&self) -> &'static str {
        "RouteGuard"
    }
}

impl<G: RouteGuard + ?Sized> RouteGuard for Arc<G> {
    fn check(
        &self,
        to: Arc<GuardContext>,
        from: Arc<GuardContext>,
        next: GuardNext,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        (**self).check(to, from, next)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A post-navigate hook. It observes a committed navigation and cannot
/// change it.
pub trait AfterGuard: Send + Sync + 'static {
    fn after(&self, to: Arc<GuardContext>, from: Arc<GuardContext>)
        -> BoxFuture<'static, anyhow::Result<()>>;

    fn name(&self) -> &'static str {
        "AfterGuard"
    }
}

impl<G: AfterGuard + ?Sized> AfterGuard for Arc<G> {
    fn after(
        &self,
        to: Arc<GuardContext>,
        from: Arc<GuardContext>,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        (**self).after(to, from)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Create a guard from an async closure.
///
/// ```
/// use waymark::guard_fn;
///
/// let guard = guard_fn(|_to, _from, next| async move {
///     next.proceed();
///     Ok(())
/// });
/// ```
pub fn guard_fn<F, Fut>(f: F) -> FnGuard<F>
where
    F: Fn(Arc<GuardContext>, Arc<GuardContext>, GuardNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnGuard { f }
}

/// Guard created from a closure via [`guard_fn`].
pub struct FnGuard<F> {
    f: F,
}

impl<F, Fut> RouteGuard for FnGuard<F>
where
    F: Fn(Arc<GuardContext>, Arc<GuardContext>, GuardNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn check(
        &self,
        to: Arc<GuardContext>,
        from: Arc<GuardContext>,
        next: GuardNext,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self.f)(to, from, next))
    }
}

/// Create a post-navigate hook from an async closure.
pub fn after_fn<F, Fut>(f: F) -> FnAfter<F>
where
    F: Fn(Arc<GuardContext>, Arc<GuardContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnAfter { f }
}

/// Post-navigate hook created from a closure via [`after_fn`].
pub struct FnAfter<F> {
    f: F,
}

impl<F, Fut> AfterGuard for FnAfter<F>
where
    F: Fn(Arc<GuardContext>, Arc<GuardContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn after(
        &self,
        to: Arc<GuardContext>,
        from: Arc<GuardContext>,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self.f)(to, from))
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// Outcome of a pre-navigate or pre-resolve sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSequenceResult {
    /// `true` when every guard let the navigation through.
    pub should_continue: bool,
    /// Set when a guard redirected.
    pub redirect_path: Option<String>,
}

impl GuardSequenceResult {
    pub fn proceed() -> Self {
        Self {
            should_continue: true,
            redirect_path: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            should_continue: false,
            redirect_path: None,
        }
    }

    pub fn redirect(path: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            redirect_path: Some(path.into()),
        }
    }
}

/// Run guards in order until one cancels or redirects.
pub async fn run_guard_sequence<G: RouteGuard + ?Sized>(
    guards: &[Arc<G>],
    to: &Arc<GuardContext>,
    from: &Arc<GuardContext>,
) -> GuardSequenceResult {
    for (index, guard) in guards.iter().enumerate() {
        let (sender, mut receiver) = oneshot::channel();
        let next = GuardNext { sender, index };

        trace_log!("running guard '{}' at index {}", guard.name(), index);
        let outcome = guard.check(Arc::clone(to), Arc::clone(from), next).await;
        let decision = receiver.try_recv().ok();

        let action = match (decision, outcome) {
            (Some(action), Ok(())) => action,
            (Some(action), Err(err)) => {
                error_log!(
                    "guard '{}' at index {} failed after deciding: {:#}",
                    guard.name(),
                    index,
                    err
                );
                action
            }
            (None, Err(err)) => {
                error_log!(
                    "guard '{}' at index {} failed: {:#}; cancelling navigation to '{}'",
                    guard.name(),
                    index,
                    err,
                    to.path()
                );
                return GuardSequenceResult::cancelled();
            }
            (None, Ok(())) => {
                warn_log!(
                    "guard '{}' at index {} did not call next(); cancelling navigation to '{}'",
                    guard.name(),
                    index,
                    to.path()
                );
                return GuardSequenceResult::cancelled();
            }
        };

        match action {
            NavigationAction::Continue => {}
            NavigationAction::Deny { reason } => {
                debug_log!("guard at index {} cancelled navigation: {}", index, reason);
                return GuardSequenceResult::cancelled();
            }
            NavigationAction::Redirect { to: target, reason } => {
                debug_log!(
                    "guard at index {} redirected to '{}' ({})",
                    index,
                    target,
                    reason.as_deref().unwrap_or("no reason")
                );
                return GuardSequenceResult::redirect(target);
            }
        }
    }

    GuardSequenceResult::proceed()
}

/// Run every post-navigate hook; failures are logged and skipped.
pub async fn run_after_sequence<G: AfterGuard + ?Sized>(
    guards: &[Arc<G>],
    to: &Arc<GuardContext>,
    from: &Arc<GuardContext>,
) {
    for (index, guard) in guards.iter().enumerate() {
        if let Err(err) = guard.after(Arc::clone(to), Arc::clone(from)).await {
            error_log!("error in post-navigate guard at index {}: {:#}", index, err);
        }
    }
}

// ============================================================================
// GuardManager
// ============================================================================

type Entries<T> = Arc<Mutex<Vec<(u64, Arc<T>)>>>;

struct Registry<T: ?Sized> {
    label: &'static str,
    entries: Entries<T>,
    next_id: AtomicU64,
}

impl<T: ?Sized + Send + Sync + 'static> Registry<T> {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    fn add(&self, guard: Arc<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, guard));
        debug_log!("registered {} guard #{}", self.label, id);

        let entries = Arc::downgrade(&self.entries);
        let label = self.label;
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(existing, _)| *existing != id);
                debug_log!("removed {} guard #{}", label, id);
            }
        })
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, guard)| Arc::clone(guard))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// The three global guard registries.
///
/// Each sequence runs over a snapshot taken when it starts, so guards added
/// or removed while a sequence is in flight affect only later navigations.
pub struct GuardManager {
    pre_navigate: Registry<dyn RouteGuard>,
    pre_resolve: Registry<dyn RouteGuard>,
    post_navigate: Registry<dyn AfterGuard>,
}

impl GuardManager {
    pub fn new() -> Self {
        Self {
            pre_navigate: Registry::new("pre-navigate"),
            pre_resolve: Registry::new("pre-resolve"),
            post_navigate: Registry::new("post-navigate"),
        }
    }

    pub fn register_pre_navigate(&self, guard: impl RouteGuard) -> Subscription {
        self.pre_navigate.add(Arc::new(guard))
    }

    pub fn register_pre_resolve(&self, guard: impl RouteGuard) -> Subscription {
        self.pre_resolve.add(Arc::new(guard))
    }

    pub fn register_post_navigate(&self, guard: impl AfterGuard) -> Subscription {
        self.post_navigate.add(Arc::new(guard))
    }

    pub async fn run_pre_navigate(
        &self,
        to: &Arc<GuardContext>,
        from: &Arc<GuardContext>,
    ) -> GuardSequenceResult {
        run_guard_sequence(&self.pre_navigate.snapshot(), to, from).await
    }

    pub async fn run_pre_resolve(
        &self,
        to: &Arc<GuardContext>,
        from: &Arc<GuardContext>,
    ) -> GuardSequenceResult {
        run_guard_sequence(&self.pre_resolve.snapshot(), to, from).await
    }

    pub async fn run_post_navigate(&self, to: &Arc<GuardContext>, from: &Arc<GuardContext>) {
        run_after_sequence(&self.post_navigate.snapshot(), to, from).await;
    }

    /// Number of `(pre-navigate, pre-resolve, post-navigate)` guards.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.pre_navigate.len(),
            self.pre_resolve.len(),
            self.post_navigate.len(),
        )
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.pre_navigate.clear();
        self.pre_resolve.clear();
        self.post_navigate.clear();
    }
}

impl Default for GuardManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GuardManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (pre_navigate, pre_resolve, post_navigate) = self.counts();
        f.debug_struct("GuardManager")
            .field("pre_navigate", &pre_navigate)
            .field("pre_resolve", &pre_resolve)
            .field("post_navigate", &post_navigate)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
