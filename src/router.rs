//! The navigation engine.
//!
//! [`Router`] owns the compiled route tree, the guard registries, the
//! history adapter and the current location. Every navigation runs through
//! the same pipeline:
//!
//! ```text
//! Idle → Matching → RunningPreNavigate → RunningMiddleware → RunningPreResolve
//!      → Committing → RunningPostNavigate → Idle
//! ```
//!
//! A cancel in any guarded phase goes `Cancelled → Idle` without touching
//! the adapter. A redirect goes `Redirecting → Matching` with the new
//! target; after [`MAX_REDIRECT_DEPTH`] redirects the navigation fails with
//! [`RouterError::RedirectLimit`].
//!
//! Overlapping navigations are not serialized. Each runs to completion on
//! its own and the last one to commit decides the visible location.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use waymark::{MemoryHistory, NavigateOptions, Route, Router};
//!
//! let history = Arc::new(MemoryHistory::new("/"));
//! let router = Router::builder(
//!     vec![
//!         Route::new("/", "Home"),
//!         Route::new("/users/:id", "User"),
//!     ],
//!     Arc::clone(&history),
//! )
//! .build()
//! .unwrap();
//!
//! pollster::block_on(async {
//!     router.start().await;
//!     let result = router.navigate("/users/7", NavigateOptions::default()).await.unwrap();
//!     assert!(result.is_committed());
//! });
//!
//! assert_eq!(router.params().get_str("id"), Some("7"));
//! assert_eq!(history.entries(), vec!["/", "/users/7"]);
//! ```

use crate::cache::{default_cache_key, CacheKeyFn, CachePolicy};
use crate::error::{NavigationPhase, NavigationResult, RouterError};
use crate::guards::{AfterGuard, GuardContext, GuardManager, GuardSequenceResult, RouteGuard};
use crate::history::HistoryAdapter;
use crate::lifecycle::{NavigationAction, NavigationState};
use crate::location::{build_url, normalize_leading_slash, Fragment, Location, UrlParts};
use crate::matching::{RouteMatch, RouteTree};
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use crate::options::RouterOptions;
use crate::params::{QueryParams, QueryUpdate, RouteParams};
use crate::pattern::MatchOptions;
use crate::route::Route;
use crate::subscription::Subscription;
use crate::{debug_log, error_log, info_log, trace_log, warn_log};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, Weak};
use tokio::sync::mpsc;

/// Maximum number of redirects followed by one navigation.
pub const MAX_REDIRECT_DEPTH: usize = 5;

// ============================================================================
// Requests
// ============================================================================

/// Where to navigate: a path, or a move through history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    /// A path, optionally with `?query` and `#fragment`. May contain
    /// `:param` tokens filled from [`NavigateOptions::params`].
    Path(String),
    /// Steps to move through history; negative goes back.
    Delta(isize),
}

impl From<&str> for NavigationTarget {
    fn from(value: &str) -> Self {
        NavigationTarget::Path(value.to_string())
    }
}

impl From<String> for NavigationTarget {
    fn from(value: String) -> Self {
        NavigationTarget::Path(value)
    }
}

impl From<isize> for NavigationTarget {
    fn from(value: isize) -> Self {
        NavigationTarget::Delta(value)
    }
}

impl From<i32> for NavigationTarget {
    fn from(value: i32) -> Self {
        NavigationTarget::Delta(isize::try_from(value).unwrap_or(0))
    }
}

/// Options for [`Router::navigate`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
    /// Values for pattern tokens in the target path.
    pub params: Option<RouteParams>,
    /// Query appended to the target.
    pub query: Option<QueryParams>,
    /// Fragment appended to the target.
    pub fragment: Option<Fragment>,
}

impl NavigateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn params(mut self, params: RouteParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = Some(query);
        self
    }

    pub fn fragment(mut self, fragment: impl Into<Fragment>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }
}

/// Options for the merging [`Router::push`] and [`Router::replace`].
///
/// With no `path` the current route is re-targeted: its pattern is filled
/// with the current params overlaid by `params`. The query is folded into
/// the current one the same way. Either merge can be turned off.
///
/// ```
/// use waymark::{PushOptions, QueryUpdate, RouteParams};
///
/// let options = PushOptions::new()
///     .params([("id", "42")].into_iter().collect::<RouteParams>())
///     .query(QueryUpdate::new().set("tab", "posts").unset("page"));
/// assert!(options.path.is_none());
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct PushOptions {
    /// Target path or pattern. `None` means the current route.
    pub path: Option<String>,
    /// Params to fill into the pattern.
    pub params: Option<RouteParams>,
    /// Changes to the query.
    pub query: Option<QueryUpdate>,
    /// Fragment of the target.
    pub fragment: Option<Fragment>,
    /// Use `params` alone instead of merging them over the current params.
    pub replace_params: bool,
    /// Start from an empty query instead of the current one.
    pub replace_query: bool,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a path instead of the current route.
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn params(mut self, params: RouteParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn query(mut self, query: QueryUpdate) -> Self {
        self.query = Some(query);
        self
    }

    pub fn fragment(mut self, fragment: impl Into<Fragment>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn replace_params(mut self, replace: bool) -> Self {
        self.replace_params = replace;
        self
    }

    pub fn replace_query(mut self, replace: bool) -> Self {
        self.replace_query = replace;
        self
    }
}

// ============================================================================
// Shared state
// ============================================================================

type LocationListener = Arc<dyn Fn(&Location) + Send + Sync>;

/// Location subscribers, called synchronously on every commit.
#[derive(Default)]
struct Subscribers {
    entries: Arc<Mutex<Vec<(u64, LocationListener)>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    fn add(&self, listener: LocationListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        let entries = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(existing, _)| *existing != id);
            }
        })
    }

    fn notify(&self, location: &Location) {
        let snapshot: Vec<LocationListener> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        trace_log!("notifying {} location subscribers", snapshot.len());
        for listener in snapshot {
            listener(location);
        }
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

/// The committed location and the route it matched.
struct Current<C> {
    location: Location,
    matched: Option<RouteMatch<C>>,
}

struct RouterInner<C> {
    tree: RouteTree<C>,
    adapter: Arc<dyn HistoryAdapter>,
    base: String,
    match_options: MatchOptions,
    cache_policy: CachePolicy,
    cache_key: CacheKeyFn,
    loading: Option<C>,
    guards: GuardManager,
    current: RwLock<Current<C>>,
    state: Mutex<NavigationState>,
    subscribers: Subscribers,
    external: Mutex<mpsc::UnboundedReceiver<()>>,
    adapter_subscription: Subscription,
    next_navigation: AtomicU64,
    disposed: AtomicBool,
}

impl<C> RouterInner<C> {
    fn read_current(&self) -> RwLockReadGuard<'_, Current<C>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<(), RouterError> {
        if self.disposed.load(Ordering::Acquire) {
            warn_log!("navigation requested on a disposed router");
            return Err(RouterError::Disposed);
        }
        Ok(())
    }

    /// Re-read the adapter, store the result as current and notify subscribers.
    fn refresh(&self) -> (Location, bool) {
        let location = self.adapter.location(&self.base);
        let matched = self.tree.resolve(&location.path, &self.match_options);
        let found = matched.is_some();
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            current.location = location.clone();
            current.matched = matched;
        }
        self.subscribers.notify(&location);
        (location, found)
    }
}

// ============================================================================
// Pipeline bookkeeping
// ============================================================================

enum Step {
    Done(NavigationResult),
    Redirect(String),
}

/// State machine of one navigation, mirrored into the router's shared state.
struct Progress<'a> {
    id: u64,
    state: NavigationState,
    shared: &'a Mutex<NavigationState>,
}

impl<'a> Progress<'a> {
    fn new(id: u64, shared: &'a Mutex<NavigationState>) -> Self {
        Self {
            id,
            state: NavigationState::Idle,
            shared,
        }
    }

    fn enter(&mut self, next: NavigationState) {
        if !self.state.can_transition_to(next) {
            warn_log!(
                "navigation #{} made an unexpected transition: {} -> {}",
                self.id,
                self.state,
                next
            );
        }
        debug_log!("navigation #{}: {} -> {}", self.id, self.state, next);
        self.state = next;
        *self.shared.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Drop back to idle after a failure.
    fn reset(&mut self) {
        debug_log!("navigation #{} aborted in state {}", self.id, self.state);
        self.state = NavigationState::Idle;
        *self.shared.lock().unwrap_or_else(PoisonError::into_inner) = NavigationState::Idle;
    }

    fn cancel(&mut self, phase: NavigationPhase) -> Step {
        self.enter(NavigationState::Cancelled);
        self.enter(NavigationState::Idle);
        Step::Done(NavigationResult::Cancelled { phase })
    }

    fn redirect(&mut self, path: String) -> Step {
        self.enter(NavigationState::Redirecting);
        Step::Redirect(path)
    }

    /// Turn a guard sequence result into a stop, or `None` to go on.
    fn settle_guards(&mut self, result: GuardSequenceResult, phase: NavigationPhase) -> Option<Step> {
        if result.should_continue {
            return None;
        }
        Some(match result.redirect_path {
            Some(path) => self.redirect(path),
            None => self.cancel(phase),
        })
    }
}

fn guard_context<C>(location: &Location, matched: Option<&RouteMatch<C>>) -> GuardContext {
    let context = GuardContext::new(location.clone());
    match matched {
        Some(matched) => context.with_route(
            matched.node.path(),
            matched.node.config.name.clone(),
            matched.params.clone(),
            matched.node.meta().clone(),
        ),
        None => context,
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder returned by [`Router::builder`].
#[must_use]
pub struct RouterBuilder<C> {
    routes: Vec<Route<C>>,
    adapter: Arc<dyn HistoryAdapter>,
    options: RouterOptions<C>,
}

impl<C: Send + Sync + 'static> RouterBuilder<C> {
    pub fn options(mut self, options: RouterOptions<C>) -> Self {
        self.options = options;
        self
    }

    /// Compile the routes, validate the options and attach to the adapter.
    pub fn build(self) -> Result<Router<C>, RouterError> {
        let RouterOptions {
            base,
            cache,
            cache_key,
            match_options,
            on_pre_navigate,
            on_pre_resolve,
            on_post_navigate,
            loading,
        } = self.options;

        let cache_policy = CachePolicy::from_setting(&cache)?;
        let tree = RouteTree::new(self.routes)?;

        let guards = GuardManager::new();
        for guard in on_pre_navigate {
            guards.register_pre_navigate(guard);
        }
        for guard in on_pre_resolve {
            guards.register_pre_resolve(guard);
        }
        for hook in on_post_navigate {
            guards.register_post_navigate(hook);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let adapter = self.adapter;
        let adapter_subscription = adapter.subscribe(Arc::new(move || {
            // The receiver only goes away with the router itself.
            let _ = sender.send(());
        }));

        let cache_key: CacheKeyFn = match cache_key {
            Some(key) => key,
            None => Arc::new(default_cache_key),
        };
        let location = adapter.location(&base);
        let matched = tree.resolve(&location.path, &match_options);
        debug_log!(
            "router built with {} root routes at '{}' (base '{}')",
            tree.roots().len(),
            location,
            base
        );

        Ok(Router {
            inner: Arc::new(RouterInner {
                tree,
                adapter,
                base,
                match_options,
                cache_policy,
                cache_key,
                loading,
                guards,
                current: RwLock::new(Current { location, matched }),
                state: Mutex::new(NavigationState::Idle),
                subscribers: Subscribers::default(),
                external: Mutex::new(receiver),
                adapter_subscription,
                next_navigation: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        })
    }
}

// ============================================================================
// Router
// ============================================================================

/// Handle to a navigation engine. Clones share the same engine.
pub struct Router<C> {
    inner: Arc<RouterInner<C>>,
}

impl<C> Clone for Router<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + Sync + 'static> Router<C> {
    /// Start building a router over `routes` backed by `adapter`.
    pub fn builder(
        routes: impl IntoIterator<Item = Route<C>>,
        adapter: impl HistoryAdapter,
    ) -> RouterBuilder<C> {
        RouterBuilder {
            routes: routes.into_iter().collect(),
            adapter: Arc::new(adapter),
            options: RouterOptions::new(),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Navigate to a path or move through history.
    pub async fn navigate(
        &self,
        target: impl Into<NavigationTarget>,
        options: NavigateOptions,
    ) -> Result<NavigationResult, RouterError> {
        match target.into() {
            NavigationTarget::Path(path) => {
                let url = build_url(
                    &path,
                    &UrlParts {
                        params: options.params.as_ref(),
                        query: options.query.as_ref(),
                        fragment: options.fragment.as_ref(),
                    },
                );
                self.run(url, options.replace).await
            }
            NavigationTarget::Delta(delta) => self.go(delta).await,
        }
    }

    /// Push a new entry, merging params and query into the current ones.
    pub async fn push(&self, options: PushOptions) -> Result<NavigationResult, RouterError> {
        let target = self.merged_target(&options);
        self.run(target, false).await
    }

    /// Like [`push`](Self::push) but replaces the current history entry.
    pub async fn replace(&self, options: PushOptions) -> Result<NavigationResult, RouterError> {
        let target = self.merged_target(&options);
        self.run(target, true).await
    }

    /// Move `delta` steps through history and process the resulting change.
    ///
    /// A move the adapter cannot make leaves everything as it is and yields
    /// [`NavigationResult::Unchanged`].
    pub async fn go(&self, delta: isize) -> Result<NavigationResult, RouterError> {
        self.inner.ensure_live()?;
        self.inner.adapter.go(delta)?;
        match self.sync_external_changes().await? {
            Some(result) => Ok(result),
            None => {
                debug_log!("history move by {} had no effect", delta);
                Ok(NavigationResult::Unchanged {
                    location: self.location(),
                })
            }
        }
    }

    pub async fn back(&self) -> Result<NavigationResult, RouterError> {
        self.go(-1).await
    }

    pub async fn forward(&self) -> Result<NavigationResult, RouterError> {
        self.go(1).await
    }

    /// Run the initial navigation. Failures are logged, never returned.
    pub async fn start(&self) -> Option<NavigationResult> {
        let initial = self.inner.adapter.initialize(&self.inner.base);
        let href = initial.href();
        {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            current.matched = self.inner.tree.resolve(&initial.path, &self.inner.match_options);
            current.location = initial;
        }

        match self.run(href.clone(), true).await {
            Ok(result) => Some(result),
            Err(err) => {
                error_log!("initial navigation to '{}' failed: {}", href, err);
                None
            }
        }
    }

    /// Process location changes the adapter reported since the last call,
    /// such as back/forward moves.
    ///
    /// Queued changes are coalesced: the adapter's current location is
    /// navigated to once, with replace semantics. Returns `None` when
    /// nothing was queued.
    pub async fn sync_external_changes(&self) -> Result<Option<NavigationResult>, RouterError> {
        let mut pending = 0usize;
        {
            let mut receiver = self
                .inner
                .external
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            while receiver.try_recv().is_ok() {
                pending += 1;
            }
        }
        if pending == 0 {
            return Ok(None);
        }

        let href = self.inner.adapter.location(&self.inner.base).href();
        debug_log!("processing {} external location change(s) to '{}'", pending, href);
        self.run(href, true).await.map(Some)
    }

    fn merged_target(&self, options: &PushOptions) -> String {
        let current = self.inner.read_current();
        let empty = RouteParams::new();
        let new_params = options.params.as_ref().unwrap_or(&empty);

        let (path, params) = match (&options.path, &current.matched) {
            (Some(path), _) => (path.clone(), options.params.clone()),
            (None, Some(matched)) => (
                matched.node.path().to_string(),
                Some(RouteParams::merge_with(
                    &matched.params,
                    new_params,
                    options.replace_params,
                )),
            ),
            (None, None) => (current.location.path.clone(), None),
        };

        let mut query = if options.replace_query {
            QueryParams::new()
        } else {
            current.location.query_params()
        };
        if let Some(update) = &options.query {
            query.apply(update);
        }

        build_url(
            &path,
            &UrlParts {
                params: params.as_ref(),
                query: Some(&query),
                fragment: options.fragment.as_ref(),
            },
        )
    }

    async fn run(&self, target: String, replace: bool) -> Result<NavigationResult, RouterError> {
        let id = self.inner.next_navigation.fetch_add(1, Ordering::Relaxed);
        let mut progress = Progress::new(id, &self.inner.state);
        let mut target = target;
        let mut redirects = 0;

        loop {
            match self.attempt(&mut progress, &target, replace).await {
                Ok(Step::Done(result)) => return Ok(result),
                Ok(Step::Redirect(next)) => {
                    redirects += 1;
                    if redirects > MAX_REDIRECT_DEPTH {
                        error_log!(
                            "redirect loop detected (depth {}) navigating to '{}'",
                            redirects,
                            next
                        );
                        progress.reset();
                        return Err(RouterError::RedirectLimit {
                            path: next,
                            limit: MAX_REDIRECT_DEPTH,
                        });
                    }
                    debug_log!("navigation #{} redirected from '{}' to '{}'", id, target, next);
                    target = next;
                }
                Err(err) => {
                    progress.reset();
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        progress: &mut Progress<'_>,
        target: &str,
        replace: bool,
    ) -> Result<Step, RouterError> {
        let inner = &self.inner;
        inner.ensure_live()?;

        let target = normalize_leading_slash(target).into_owned();
        progress.enter(NavigationState::Matching);
        let to = Location::parse(&target);
        let matched = inner.tree.resolve(&to.path, &inner.match_options);
        let (from, from_context) = {
            let current = inner.read_current();
            (
                current.location.clone(),
                guard_context(&current.location, current.matched.as_ref()),
            )
        };
        let to_context = Arc::new(guard_context(&to, matched.as_ref()));
        let from_context = Arc::new(from_context);

        progress.enter(NavigationState::RunningPreNavigate);
        let result = inner.guards.run_pre_navigate(&to_context, &from_context).await;
        if let Some(step) = progress.settle_guards(result, NavigationPhase::PreNavigate) {
            return Ok(step);
        }

        progress.enter(NavigationState::RunningMiddleware);
        let chain = MiddlewareChain::new(
            matched
                .as_ref()
                .map(RouteMatch::middlewares)
                .unwrap_or_default(),
        );
        let mut context = MiddlewareContext::new(to.clone(), from.clone())
            .with_params(to_context.params.clone())
            .with_meta(to_context.meta.clone())
            .with_redirector(self.redirector(replace));
        match chain.run(&mut context).await? {
            NavigationAction::Continue => {}
            NavigationAction::Deny { reason } => {
                debug_log!("middleware cancelled navigation to '{}': {}", target, reason);
                return Ok(progress.cancel(NavigationPhase::Middleware));
            }
            NavigationAction::Redirect { to, .. } => return Ok(progress.redirect(to)),
        }

        progress.enter(NavigationState::RunningPreResolve);
        let result = inner.guards.run_pre_resolve(&to_context, &from_context).await;
        if let Some(step) = progress.settle_guards(result, NavigationPhase::PreResolve) {
            return Ok(step);
        }

        progress.enter(NavigationState::Committing);
        if replace {
            inner.adapter.replace(&target, &inner.base)?;
        } else {
            inner.adapter.push(&target, &inner.base)?;
        }
        let (location, found) = inner.refresh();
        info_log!("navigation #{}: {} -> {}", progress.id, from, location);

        progress.enter(NavigationState::RunningPostNavigate);
        inner.guards.run_post_navigate(&to_context, &from_context).await;
        progress.enter(NavigationState::Idle);

        Ok(Step::Done(if found {
            NavigationResult::Committed { location }
        } else {
            NavigationResult::NotFound { location }
        }))
    }

    /// Handler behind [`MiddlewareContext::redirect`]: rewrite the address
    /// right away and notify subscribers.
    fn redirector(&self, replace: bool) -> impl Fn(&str) + Send + Sync + 'static {
        let inner: Weak<RouterInner<C>> = Arc::downgrade(&self.inner);
        move |path: &str| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if inner.disposed.load(Ordering::Acquire) {
                return;
            }
            let target = normalize_leading_slash(path);
            match inner.adapter.redirect(&target, &inner.base, replace) {
                Ok(()) => {
                    inner.refresh();
                }
                Err(err) => warn_log!("middleware redirect to '{}' failed: {}", target, err),
            }
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Call `listener` with the new location after every commit.
    pub fn subscribe(&self, listener: impl Fn(&Location) + Send + Sync + 'static) -> Subscription {
        self.inner.subscribers.add(Arc::new(listener))
    }

    /// Register a pre-navigate guard.
    pub fn before_each(&self, guard: impl RouteGuard) -> Subscription {
        self.inner.guards.register_pre_navigate(guard)
    }

    /// Register a pre-resolve guard.
    pub fn before_resolve(&self, guard: impl RouteGuard) -> Subscription {
        self.inner.guards.register_pre_resolve(guard)
    }

    /// Register a post-navigate hook.
    pub fn after_each(&self, hook: impl AfterGuard) -> Subscription {
        self.inner.guards.register_post_navigate(hook)
    }

    pub fn guards(&self) -> &GuardManager {
        &self.inner.guards
    }

    /// Detach from the adapter and drop every subscriber and guard.
    ///
    /// Later navigations fail with [`RouterError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.adapter_subscription.unsubscribe();
        self.inner.subscribers.clear();
        self.inner.guards.clear();
        debug_log!("router disposed at '{}'", self.location());
    }
}

impl<C> Router<C> {
    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// The committed location.
    pub fn location(&self) -> Location {
        self.inner.read_current().location.clone()
    }

    /// The route matched by the committed location.
    pub fn current_match(&self) -> Option<RouteMatch<C>> {
        self.inner.read_current().matched.clone()
    }

    /// Params of the current match; empty when nothing matched.
    pub fn params(&self) -> RouteParams {
        self.inner
            .read_current()
            .matched
            .as_ref()
            .map(|matched| matched.params.clone())
            .unwrap_or_default()
    }

    /// State of the most recent navigation.
    pub fn state(&self) -> NavigationState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn base(&self) -> &str {
        &self.inner.base
    }

    pub fn routes(&self) -> &RouteTree<C> {
        &self.inner.tree
    }

    pub fn match_options(&self) -> &MatchOptions {
        &self.inner.match_options
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.inner.cache_policy
    }

    /// Cache key of `location` under the configured key function.
    pub fn cache_key_for(&self, location: &Location) -> String {
        (self.inner.cache_key)(location)
    }

    /// Global loading placeholder.
    pub fn loading(&self) -> Option<&C> {
        self.inner.loading.as_ref()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl<C> fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("base", &self.inner.base)
            .field("location", &self.inner.read_current().location)
            .field("state", &self.state())
            .field("guards", &self.inner.guards)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRules;
    use crate::guards::{after_fn, guard_fn};
    use crate::history::{ChangeListener, MemoryHistory};
    use crate::middleware::middleware_fn;
    use pollster::block_on;

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn routes() -> Vec<Route<&'static str>> {
        vec![
            Route::new("/", "Home"),
            Route::new("/login", "Login"),
            Route::new("/users/:id", "User"),
            Route::new("/dashboard", "DashboardLayout")
                .child(Route::new("/dashboard", "Overview"))
                .child(Route::new("/dashboard/settings", "Settings")),
        ]
    }

    fn router(history: &Arc<MemoryHistory>) -> Router<&'static str> {
        Router::builder(routes(), Arc::clone(history)).build().unwrap()
    }

    fn go_to(router: &Router<&'static str>, path: &str) -> NavigationResult {
        block_on(router.navigate(path, NavigateOptions::default())).unwrap()
    }

    #[test]
    fn test_navigate_commits_and_pushes() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        let result = go_to(&router, "/users/7");

        assert!(result.is_committed());
        assert_eq!(router.location().path, "/users/7");
        assert_eq!(router.params().get_str("id"), Some("7"));
        assert_eq!(router.state(), NavigationState::Idle);
        assert_eq!(history.entries(), vec!["/", "/users/7"]);
    }

    #[test]
    fn test_integer_targets_are_deltas() {
        assert_eq!(NavigationTarget::from(-1i32), NavigationTarget::Delta(-1));
        assert_eq!(NavigationTarget::from(2isize), NavigationTarget::Delta(2));
        assert_eq!(
            NavigationTarget::from("/users"),
            NavigationTarget::Path("/users".to_string())
        );
    }

    #[test]
    fn test_relative_target_gets_leading_slash() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        go_to(&router, "login");
        assert_eq!(router.location().path, "/login");
    }

    #[test]
    fn test_replace_option_replaces_entry() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        block_on(router.navigate("/login", NavigateOptions::new().replace(true))).unwrap();
        assert_eq!(history.entries(), vec!["/login"]);
    }

    #[test]
    fn test_navigate_fills_params_and_query() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        let options = NavigateOptions::new()
            .params([("id", "42")].into_iter().collect())
            .query([("tab", "posts")].into_iter().collect())
            .fragment("top");
        block_on(router.navigate("/users/:id", options)).unwrap();

        let location = router.location();
        assert_eq!(location.path, "/users/42");
        assert_eq!(location.query, "tab=posts");
        assert_eq!(location.fragment, "top");
    }

    #[test]
    fn test_unmatched_path_is_not_found() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        let result = go_to(&router, "/missing");

        assert!(result.is_not_found());
        assert_eq!(router.location().path, "/missing");
        assert!(router.current_match().is_none());
    }

    #[test]
    fn test_nested_match_prefers_child() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);

        go_to(&router, "/dashboard");
        let matched = router.current_match().unwrap();
        assert_eq!(matched.node.view().ready(), Some(&"Overview"));
        assert_eq!(matched.chain.len(), 2);
    }

    #[test]
    fn test_subscribers_see_committed_location() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        let seen: CallLog = Arc::default();
        let sink = Arc::clone(&seen);
        let subscription = router.subscribe(move |location| {
            sink.lock().unwrap().push(location.href());
        });

        go_to(&router, "/users/1?tab=a");
        subscription.unsubscribe();
        go_to(&router, "/login");

        assert_eq!(*seen.lock().unwrap(), vec!["/users/1?tab=a"]);
        assert_eq!(router.subscriber_count(), 0);
    }

    #[test]
    fn test_pre_navigate_cancel_commits_nothing() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.before_each(guard_fn(|_to, _from, next| async move {
            next.cancel();
            Ok(())
        }));

        let result = go_to(&router, "/login");

        assert_eq!(
            result,
            NavigationResult::Cancelled {
                phase: NavigationPhase::PreNavigate
            }
        );
        assert_eq!(router.location().path, "/");
        assert_eq!(history.entries(), vec!["/"]);
        assert_eq!(router.state(), NavigationState::Idle);
    }

    #[test]
    fn test_guard_redirect_restarts_pipeline() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.before_each(guard_fn(|to, _from, next| async move {
            if to.path().starts_with("/dashboard") {
                next.redirect("/login");
            } else {
                next.proceed();
            }
            Ok(())
        }));

        let result = go_to(&router, "/dashboard/settings");

        assert!(result.is_committed());
        assert_eq!(router.location().path, "/login");
        assert_eq!(history.entries(), vec!["/", "/login"]);
    }

    #[test]
    fn test_redirect_loop_is_capped() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.before_each(guard_fn(|to, _from, next| async move {
            if to.path() == "/login" {
                next.redirect("/users/1");
            } else {
                next.redirect("/login");
            }
            Ok(())
        }));

        let err = block_on(router.navigate("/login", NavigateOptions::default())).unwrap_err();

        assert!(matches!(
            err,
            RouterError::RedirectLimit {
                limit: MAX_REDIRECT_DEPTH,
                ..
            }
        ));
        assert_eq!(router.state(), NavigationState::Idle);
        assert_eq!(history.entries(), vec!["/"]);
    }

    #[test]
    fn test_guard_error_cancels() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.before_resolve(guard_fn(|_to, _from, _next| async move {
            Err::<(), _>(anyhow::anyhow!("session lookup failed"))
        }));

        let result = go_to(&router, "/login");

        assert_eq!(
            result,
            NavigationResult::Cancelled {
                phase: NavigationPhase::PreResolve
            }
        );
        assert_eq!(router.location().path, "/");
    }

    #[test]
    fn test_middleware_cancel_and_redirect() {
        let history = Arc::new(MemoryHistory::new("/"));
        let table = vec![
            Route::new("/", "Home"),
            Route::new("/login", "Login"),
            Route::new("/closed", "Closed").middleware(middleware_fn(|_ctx, next| {
                Box::pin(async move { next.cancel().await })
            })),
            Route::new("/old", "Old").middleware(middleware_fn(|_ctx, next| {
                Box::pin(async move { next.redirect("/login").await })
            })),
        ];
        let router = Router::builder(table, Arc::clone(&history)).build().unwrap();

        let cancelled = go_to(&router, "/closed");
        assert_eq!(
            cancelled,
            NavigationResult::Cancelled {
                phase: NavigationPhase::Middleware
            }
        );

        let redirected = go_to(&router, "/old");
        assert!(redirected.is_committed());
        assert_eq!(router.location().path, "/login");
        assert_eq!(history.entries(), vec!["/", "/login"]);
    }

    #[test]
    fn test_middleware_side_channel_redirect_notifies() {
        let history = Arc::new(MemoryHistory::new("/"));
        let table = vec![
            Route::new("/", "Home"),
            Route::new("/moved", "Moved"),
            Route::new("/legacy", "Legacy").middleware(middleware_fn(|ctx, next| {
                Box::pin(async move {
                    ctx.redirect("/moved");
                    next.cancel().await
                })
            })),
        ];
        let router = Router::builder(table, Arc::clone(&history)).build().unwrap();
        let seen: CallLog = Arc::default();
        let sink = Arc::clone(&seen);
        router.subscribe(move |location| sink.lock().unwrap().push(location.path.clone()));

        let result = go_to(&router, "/legacy");

        assert!(result.is_cancelled());
        assert_eq!(router.location().path, "/moved");
        assert_eq!(*seen.lock().unwrap(), vec!["/moved"]);
        assert_eq!(history.entries(), vec!["/", "/moved"]);
    }

    #[test]
    fn test_middleware_protocol_violation_rejects() {
        let history = Arc::new(MemoryHistory::new("/"));
        let table = vec![
            Route::new("/", "Home"),
            Route::new("/twice", "Twice").middleware(middleware_fn(|ctx, next| {
                Box::pin(async move {
                    next.proceed(ctx).await?;
                    next.proceed(ctx).await
                })
            })),
        ];
        let router = Router::builder(table, Arc::clone(&history)).build().unwrap();

        let err = block_on(router.navigate("/twice", NavigateOptions::default())).unwrap_err();

        assert!(matches!(err, RouterError::NextCalledTwice));
        assert_eq!(router.location().path, "/");
        assert_eq!(router.state(), NavigationState::Idle);
    }

    #[test]
    fn test_post_navigate_sees_both_ends() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        let calls: CallLog = Arc::default();
        let sink = Arc::clone(&calls);
        router.after_each(after_fn(move |to, from| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock()
                    .unwrap()
                    .push(format!("{} <- {}", to.path(), from.path()));
                Ok(())
            }
        }));

        go_to(&router, "/users/3");
        go_to(&router, "/dashboard/settings");

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["/users/3 <- /", "/dashboard/settings <- /users/3"]
        );
    }

    #[test]
    fn test_from_context_carries_current_route() {
        let history = Arc::new(MemoryHistory::new("/users/9"));
        let router = router(&history);
        let seen: CallLog = Arc::default();
        let sink = Arc::clone(&seen);
        router.before_each(guard_fn(move |_to, from, next| {
            let sink = Arc::clone(&sink);
            async move {
                let id = from.params.get_str("id").unwrap_or("-").to_string();
                sink.lock().unwrap().push(id);
                next.proceed();
                Ok(())
            }
        }));

        go_to(&router, "/login");
        assert_eq!(*seen.lock().unwrap(), vec!["9"]);
    }

    #[test]
    fn test_push_merges_params_and_query() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        go_to(&router, "/users/1?tab=info&page=2");

        let result = block_on(
            router.push(
                PushOptions::new()
                    .params([("id", "2")].into_iter().collect())
                    .query(QueryUpdate::new().unset("page")),
            ),
        )
        .unwrap();

        assert!(result.is_committed());
        assert_eq!(router.location().href(), "/users/2?tab=info");
        assert_eq!(history.entries().len(), 3);
    }

    #[test]
    fn test_replace_with_fresh_query() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        go_to(&router, "/users/1?tab=info");

        block_on(
            router.replace(
                PushOptions::to("/login")
                    .query(QueryUpdate::new().set("next", "/users/1"))
                    .replace_query(true),
            ),
        )
        .unwrap();

        assert_eq!(router.location().path, "/login");
        assert_eq!(router.location().query_params().get("next"), Some("/users/1"));
        assert_eq!(router.location().query_params().get("tab"), None);
        assert_eq!(history.entries().len(), 2);
    }

    #[test]
    fn test_back_and_out_of_range() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        go_to(&router, "/login");

        let back = block_on(router.back()).unwrap();
        assert!(back.is_committed());
        assert_eq!(router.location().path, "/");
        assert!(history.can_go_forward());

        let stuck = block_on(router.navigate(-5, NavigateOptions::default())).unwrap();
        assert_eq!(
            stuck,
            NavigationResult::Unchanged {
                location: Location::parse("/")
            }
        );
    }

    #[test]
    fn test_external_changes_are_coalesced() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        go_to(&router, "/login");
        go_to(&router, "/users/5");

        history.back().unwrap();
        history.back().unwrap();
        let result = block_on(router.sync_external_changes()).unwrap();

        assert_eq!(result.and_then(|r| r.location().cloned()), Some(Location::parse("/")));
        assert!(block_on(router.sync_external_changes()).unwrap().is_none());
    }

    #[test]
    fn test_start_runs_initial_navigation() {
        let history = Arc::new(MemoryHistory::new("/users/4?x=1"));
        let router = router(&history);

        let result = block_on(router.start());

        assert!(result.is_some_and(|r| r.is_committed()));
        assert_eq!(router.params().get_str("id"), Some("4"));
        assert_eq!(history.entries(), vec!["/users/4?x=1"]);
    }

    #[test]
    fn test_start_swallows_errors() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.before_each(guard_fn(|_to, _from, next| async move {
            next.redirect("/");
            Ok(())
        }));

        assert!(block_on(router.start()).is_none());
    }

    #[test]
    fn test_base_prefix_is_applied_and_stripped() {
        let history = Arc::new(MemoryHistory::new("/app"));
        let router = Router::builder(routes(), Arc::clone(&history))
            .options(RouterOptions::new().base("/app"))
            .build()
            .unwrap();

        assert_eq!(router.location().path, "/");
        go_to(&router, "/users/3");

        assert_eq!(router.location().path, "/users/3");
        assert_eq!(history.entries(), vec!["/app", "/app/users/3"]);
    }

    #[test]
    fn test_conflicting_cache_rules_fail_build() {
        let history = Arc::new(MemoryHistory::new("/"));
        let result = Router::builder(routes(), Arc::clone(&history))
            .options(RouterOptions::new().cache(CacheRules::new().include("/a").exclude("/b")))
            .build();

        assert!(matches!(result, Err(RouterError::Configuration(_))));
    }

    #[test]
    fn test_option_guards_are_registered() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = Router::builder(routes(), Arc::clone(&history))
            .options(RouterOptions::new().before_each(guard_fn(|_to, _from, next| async move {
                next.cancel();
                Ok(())
            })))
            .build()
            .unwrap();

        assert_eq!(router.guards().counts(), (1, 0, 0));
        assert!(go_to(&router, "/login").is_cancelled());
    }

    #[test]
    fn test_dispose_rejects_navigation() {
        let history = Arc::new(MemoryHistory::new("/"));
        let router = router(&history);
        router.subscribe(|_| {});
        router.before_each(guard_fn(|_to, _from, next| async move {
            next.proceed();
            Ok(())
        }));

        router.dispose();
        router.dispose();

        assert!(router.is_disposed());
        assert_eq!(router.subscriber_count(), 0);
        assert_eq!(router.guards().counts(), (0, 0, 0));
        assert_eq!(history.listener_count(), 0);
        let err = block_on(router.navigate("/login", NavigateOptions::default())).unwrap_err();
        assert!(matches!(err, RouterError::Disposed));
    }

    struct ReadOnlyHistory(MemoryHistory);

    impl HistoryAdapter for ReadOnlyHistory {
        fn location(&self, base: &str) -> Location {
            self.0.location(base)
        }

        fn push(&self, path: &str, _base: &str) -> Result<(), RouterError> {
            Err(RouterError::Adapter(format!("cannot push '{path}'")))
        }

        fn replace(&self, path: &str, _base: &str) -> Result<(), RouterError> {
            Err(RouterError::Adapter(format!("cannot replace with '{path}'")))
        }

        fn subscribe(&self, listener: ChangeListener) -> Subscription {
            self.0.subscribe(listener)
        }

        fn go(&self, delta: isize) -> Result<(), RouterError> {
            self.0.go(delta)
        }
    }

    #[test]
    fn test_adapter_failure_rejects_and_resets() {
        let router = Router::builder(routes(), ReadOnlyHistory(MemoryHistory::new("/")))
            .build()
            .unwrap();
        let seen: CallLog = CallLog::default();
        let sink = Arc::clone(&seen);
        router.subscribe(move |location| sink.lock().unwrap().push(location.path.clone()));

        let err = block_on(router.navigate("/login", NavigateOptions::default())).unwrap_err();

        assert!(matches!(err, RouterError::Adapter(_)));
        assert_eq!(router.location().path, "/");
        assert_eq!(router.state(), NavigationState::Idle);
        assert!(seen.lock().unwrap().is_empty());
    }
}
