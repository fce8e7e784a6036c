//! Route definitions.
//!
//! A route table is declared with the [`Route`] builder and compiled once
//! into an immutable [`RouteTree`](crate::RouteTree) of [`RouteNode`]s when
//! the router is built.
//!
//! Children are declared with their **full** path from the root, not a
//! fragment relative to the parent. Nothing is prefixed automatically:
//!
//! ```
//! use waymark::Route;
//!
//! let table = Route::new("/dashboard", "DashboardLayout")
//!     .child(Route::new("/dashboard", "Overview"))
//!     .child(Route::new("/dashboard/settings", "Settings"));
//! assert_eq!(table.children().len(), 2);
//! ```
//!
//! The component type `C` is whatever the host renderer understands: a
//! function pointer, an enum of screens, a boxed widget factory.

use crate::error::ConfigError;
use crate::middleware::Middleware;
use crate::pattern::{MatchOverrides, PathPattern};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Opaque per-route data, exposed to guards and middleware.
pub type Meta = serde_json::Map<String, Value>;

// ============================================================================
// ViewRef
// ============================================================================

/// The view a route renders.
///
/// The variant is fixed when the route table is declared. An immediate view
/// is available synchronously; a deferred view is produced by an async
/// loader the first time it is needed and memoized afterwards.
pub enum ViewRef<C> {
    /// The component is available right away.
    Immediate(C),
    /// The component is produced by an async loader.
    Deferred(DeferredView<C>),
}

impl<C> ViewRef<C> {
    /// The component if it is available without awaiting.
    pub fn ready(&self) -> Option<&C> {
        match self {
            ViewRef::Immediate(component) => Some(component),
            ViewRef::Deferred(deferred) => deferred.get(),
        }
    }

    /// Check if this view is deferred.
    pub fn is_deferred(&self) -> bool {
        matches!(self, ViewRef::Deferred(_))
    }

    /// Resolve the component, running the loader on first use.
    pub async fn resolve(&self) -> &C {
        match self {
            ViewRef::Immediate(component) => component,
            ViewRef::Deferred(deferred) => deferred.load().await,
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for ViewRef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewRef::Immediate(component) => f.debug_tuple("Immediate").field(component).finish(),
            ViewRef::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
        }
    }
}

type Loader<C> = Arc<dyn Fn() -> BoxFuture<'static, C> + Send + Sync>;

/// A component produced by an async loader at most once.
pub struct DeferredView<C> {
    loader: Loader<C>,
    cell: OnceCell<C>,
}

impl<C: 'static> DeferredView<C> {
    /// Wrap an async loader.
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = C> + Send + 'static,
    {
        Self {
            loader: Arc::new(move || -> BoxFuture<'static, C> { Box::pin(loader()) }),
            cell: OnceCell::new(),
        }
    }
}

impl<C> DeferredView<C> {
    /// The loaded component, if the loader has finished.
    pub fn get(&self) -> Option<&C> {
        self.cell.get()
    }

    /// Check if the loader has finished.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Run the loader if needed and return the component.
    ///
    /// Concurrent callers share one loader run.
    pub async fn load(&self) -> &C {
        self.cell.get_or_init(|| (self.loader)()).await
    }
}

impl<C: fmt::Debug> fmt::Debug for DeferredView<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredView")
            .field("loaded", &self.cell.get())
            .finish()
    }
}

// ============================================================================
// Route (builder)
// ============================================================================

/// Static configuration of a route, shared by the builder and the compiled node.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    /// Full path pattern from the root.
    pub path: String,
    /// Optional name for diagnostics.
    pub name: Option<String>,
    /// Opaque data handed to guards and middleware.
    pub meta: Meta,
    /// Overrides of the router-wide match options for this route only.
    pub match_overrides: MatchOverrides,
}

/// Declarative route definition.
///
/// ```
/// use serde_json::json;
/// use waymark::{middleware_fn, MatchOverrides, Route};
///
/// let route = Route::new("/admin/:section", "Admin")
///     .name("admin")
///     .meta("requiresAuth", json!(true))
///     .match_overrides(MatchOverrides::new().case_sensitive(true))
///     .middleware(middleware_fn(|ctx, next| Box::pin(async move { next.proceed(ctx).await })));
///
/// assert_eq!(route.config().path, "/admin/:section");
/// assert_eq!(route.config().meta["requiresAuth"], json!(true));
/// ```
pub struct Route<C> {
    config: RouteConfig,
    view: ViewRef<C>,
    loading: Option<C>,
    middlewares: Vec<Arc<dyn Middleware>>,
    children: Vec<Route<C>>,
}

impl<C> Route<C> {
    /// A route with an immediate view.
    pub fn new(path: impl Into<String>, component: C) -> Self {
        Self::with_view(path, ViewRef::Immediate(component))
    }

    /// A route whose view comes from an async loader.
    pub fn deferred<F, Fut>(path: impl Into<String>, loader: F) -> Self
    where
        C: 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = C> + Send + 'static,
    {
        Self::with_view(path, ViewRef::Deferred(DeferredView::new(loader)))
    }

    /// A route with an explicit [`ViewRef`].
    pub fn with_view(path: impl Into<String>, view: ViewRef<C>) -> Self {
        Self {
            config: RouteConfig {
                path: path.into(),
                ..RouteConfig::default()
            },
            view,
            loading: None,
            middlewares: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Attach one meta entry.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.meta.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn match_overrides(mut self, overrides: MatchOverrides) -> Self {
        self.config.match_overrides = overrides;
        self
    }

    /// Component shown while this route's deferred view is loading.
    #[must_use]
    pub fn loading(mut self, component: C) -> Self {
        self.loading = Some(component);
        self
    }

    /// Append a middleware. Route middleware runs after its ancestors'.
    #[must_use]
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append a child route.
    #[must_use]
    pub fn child(mut self, child: Route<C>) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child routes.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Route<C>>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn children(&self) -> &[Route<C>] {
        &self.children
    }

    /// Compile this route and its descendants.
    pub(crate) fn compile(self) -> Result<Arc<RouteNode<C>>, ConfigError> {
        let pattern = PathPattern::new(self.config.path.as_str())?;
        let children = self
            .children
            .into_iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(RouteNode {
            config: self.config,
            pattern,
            view: self.view,
            loading: self.loading,
            middlewares: self.middlewares,
            children,
        }))
    }
}

impl<C> fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.config.path)
            .field("middlewares", &self.middlewares.len())
            .field("children", &self.children)
            .finish()
    }
}

// ============================================================================
// RouteNode (compiled)
// ============================================================================

/// A compiled, immutable route.
pub struct RouteNode<C> {
    /// Static configuration.
    pub config: RouteConfig,
    pattern: PathPattern,
    view: ViewRef<C>,
    loading: Option<C>,
    middlewares: Vec<Arc<dyn Middleware>>,
    /// Compiled child routes, in declaration order.
    pub children: Vec<Arc<RouteNode<C>>>,
}

impl<C> RouteNode<C> {
    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn view(&self) -> &ViewRef<C> {
        &self.view
    }

    pub fn loading(&self) -> Option<&C> {
        self.loading.as_ref()
    }

    pub fn meta(&self) -> &Meta {
        &self.config.meta
    }

    /// This route's own middleware, without ancestors'.
    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

impl<C> fmt::Debug for RouteNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("path", &self.config.path)
            .field("name", &self.config.name)
            .field("children", &self.children.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
