//! Rendering the current route through a host renderer.
//!
//! [`RouterView`] sits between a [`Router`] and whatever turns components
//! into views. For each render it:
//!
//! 1. Maps "no match" to [`Renderer::not_found`]. Not-found views are never
//!    retained.
//! 2. Checks eligibility under the router's [`CachePolicy`]. Only eligible
//!    locations touch the [`ViewCache`].
//! 3. On a cache hit returns the retained view.
//! 4. Otherwise renders the matched component. A deferred component that is
//!    still loading renders a placeholder instead, which is not retained.
//!
//! The placeholder is the route's own loading component if it has one, then
//! the router's global loading component, then [`Renderer::placeholder`].

use crate::cache::{CachePolicy, ViewCache};
use crate::location::Location;
use crate::matching::RouteMatch;
use crate::params::RouteParams;
use crate::router::Router;
use crate::trace_log;
use std::fmt;

/// Turns route components into host views.
///
/// Two calls with the same component and equal params must produce views
/// that are interchangeable, since either may be served from the cache.
pub trait Renderer<C>: Send + Sync {
    /// Opaque view handle.
    type View: Clone;

    /// Render a matched component with its params.
    fn render(&self, component: &C, params: &RouteParams) -> Self::View;

    /// View for a location no route matched.
    fn not_found(&self, location: &Location) -> Self::View;

    /// Fallback view while a deferred component loads.
    fn placeholder(&self) -> Self::View;
}

/// Renders the router's current route, retaining views per the cache policy.
pub struct RouterView<C, R: Renderer<C>> {
    renderer: R,
    cache: ViewCache<R::View>,
    policy: CachePolicy,
    _component: std::marker::PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static, R: Renderer<C>> RouterView<C, R> {
    pub fn new(router: &Router<C>, renderer: R) -> Self {
        let policy = router.cache_policy().clone();
        Self {
            renderer,
            cache: ViewCache::new(policy.limit()),
            policy,
            _component: std::marker::PhantomData,
        }
    }

    /// Render without awaiting; pending deferred views show a placeholder.
    pub fn render_now(&mut self, router: &Router<C>) -> R::View {
        let location = router.location();
        let Some(matched) = router.current_match() else {
            return self.renderer.not_found(&location);
        };

        let key = self.eligible_key(router, &location);
        if let Some(view) = key.as_deref().and_then(|key| self.cached(key)) {
            return view;
        }

        match matched.node.view().ready() {
            Some(component) => {
                let view = self.renderer.render(component, &matched.params);
                self.retain(key, &view, location);
                view
            }
            None => self.placeholder(router, &matched),
        }
    }

    /// Render, waiting for a deferred component to load first.
    pub async fn render(&mut self, router: &Router<C>) -> R::View {
        let location = router.location();
        let Some(matched) = router.current_match() else {
            return self.renderer.not_found(&location);
        };

        let key = self.eligible_key(router, &location);
        if let Some(view) = key.as_deref().and_then(|key| self.cached(key)) {
            return view;
        }

        let component = matched.node.view().resolve().await;
        let view = self.renderer.render(component, &matched.params);
        self.retain(key, &view, location);
        view
    }

    /// Change how many views are retained. Extra entries are evicted now.
    pub fn set_cache_limit(&mut self, limit: usize) {
        self.cache.set_max_entries(limit);
    }

    pub fn cache(&self) -> &ViewCache<R::View> {
        &self.cache
    }

    /// Drop every retained view.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn eligible_key(&self, router: &Router<C>, location: &Location) -> Option<String> {
        if self.policy.should_cache(&location.path) {
            Some(router.cache_key_for(location))
        } else {
            trace_log!("'{}' is not eligible for view caching", location.path);
            None
        }
    }

    fn cached(&mut self, key: &str) -> Option<R::View> {
        self.cache.get(key).map(|entry| entry.view.clone())
    }

    fn retain(&mut self, key: Option<String>, view: &R::View, location: Location) {
        if let Some(key) = key {
            self.cache.set(key, view.clone(), location);
        }
    }

    fn placeholder(&self, router: &Router<C>, matched: &RouteMatch<C>) -> R::View {
        match matched.node.loading().or_else(|| router.loading()) {
            Some(loading) => self.renderer.render(loading, &matched.params),
            None => self.renderer.placeholder(),
        }
    }
}

impl<C: Send + Sync + 'static> Router<C> {
    /// Create a [`RouterView`] for this router.
    pub fn view<R: Renderer<C>>(&self, renderer: R) -> RouterView<C, R> {
        RouterView::new(self, renderer)
    }
}

impl<C, R: Renderer<C>> fmt::Debug for RouterView<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterView")
            .field("cached", &self.cache.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRules;
    use crate::history::MemoryHistory;
    use crate::options::RouterOptions;
    use crate::route::Route;
    use crate::router::NavigateOptions;
    use pollster::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Renders `component:param` and counts renders to tell hits from misses.
    #[derive(Default)]
    struct Text {
        renders: AtomicUsize,
    }

    impl Renderer<&'static str> for Text {
        type View = String;

        fn render(&self, component: &&'static str, params: &RouteParams) -> String {
            self.renders.fetch_add(1, Ordering::SeqCst);
            match params.get_str("id") {
                Some(id) => format!("{component}:{id}"),
                None => component.to_string(),
            }
        }

        fn not_found(&self, location: &Location) -> String {
            format!("404 {}", location.path)
        }

        fn placeholder(&self) -> String {
            "...".to_string()
        }
    }

    fn router(options: RouterOptions<&'static str>) -> Router<&'static str> {
        let routes = vec![
            Route::new("/", "Home"),
            Route::new("/users/:id", "User"),
            Route::new("/admin", "Admin"),
            Route::deferred("/reports", || async { "Reports" }),
            Route::deferred("/slow", || async { "Slow" }).loading("SlowSpinner"),
        ];
        Router::builder(routes, Arc::new(MemoryHistory::new("/")))
            .options(options)
            .build()
            .unwrap()
    }

    fn go(router: &Router<&'static str>, path: &str) {
        block_on(router.navigate(path, NavigateOptions::default())).unwrap();
    }

    #[test]
    fn test_not_found_view() {
        let router = router(RouterOptions::new());
        let mut view = router.view(Text::default());

        go(&router, "/nowhere");
        assert_eq!(view.render_now(&router), "404 /nowhere");
    }

    #[test]
    fn test_caching_off_renders_every_time() {
        let router = router(RouterOptions::new());
        let mut view = router.view(Text::default());

        go(&router, "/users/1");
        view.render_now(&router);
        view.render_now(&router);

        assert_eq!(view.renderer().renders.load(Ordering::SeqCst), 2);
        assert!(view.cache().is_empty());
    }

    #[test]
    fn test_first_view_is_retained() {
        let router = router(RouterOptions::new().cache(true));
        let mut view = router.view(Text::default());

        go(&router, "/users/1");
        assert_eq!(view.render_now(&router), "User:1");
        go(&router, "/admin");
        view.render_now(&router);
        go(&router, "/users/1");
        assert_eq!(view.render_now(&router), "User:1");

        assert_eq!(view.renderer().renders.load(Ordering::SeqCst), 2);
        assert_eq!(view.cache().stats().hits, 1);
    }

    #[test]
    fn test_excluded_path_skips_cache() {
        let router = router(RouterOptions::new().cache(CacheRules::new().exclude("/admin")));
        let mut view = router.view(Text::default());

        go(&router, "/admin");
        view.render_now(&router);
        go(&router, "/users/2");
        view.render_now(&router);

        assert!(!view.cache().contains("/admin"));
        assert!(view.cache().contains("/users/2"));
    }

    #[test]
    fn test_custom_cache_key() {
        let options = RouterOptions::new()
            .cache(true)
            .cache_key(|location: &Location| location.href());
        let router = router(options);
        let mut view = router.view(Text::default());

        go(&router, "/users/1?tab=a");
        view.render_now(&router);
        assert!(view.cache().contains("/users/1?tab=a"));
    }

    #[test]
    fn test_pending_deferred_view_uses_placeholders() {
        let router = router(RouterOptions::new().cache(true).loading("GlobalSpinner"));
        let mut view = router.view(Text::default());

        go(&router, "/reports");
        assert_eq!(view.render_now(&router), "GlobalSpinner");
        go(&router, "/slow");
        assert_eq!(view.render_now(&router), "SlowSpinner");
        assert!(view.cache().is_empty());
    }

    #[test]
    fn test_renderer_placeholder_is_last_resort() {
        let router = router(RouterOptions::new());
        let mut view = router.view(Text::default());

        go(&router, "/reports");
        assert_eq!(view.render_now(&router), "...");
    }

    #[test]
    fn test_render_resolves_deferred_view() {
        let router = router(RouterOptions::new().cache(true));
        let mut view = router.view(Text::default());

        go(&router, "/reports");
        assert_eq!(block_on(view.render(&router)), "Reports");
        assert_eq!(view.render_now(&router), "Reports");
        assert!(view.cache().contains("/reports"));
    }

    #[test]
    fn test_set_cache_limit_evicts() {
        let router = router(RouterOptions::new().cache(true));
        let mut view = router.view(Text::default());

        for path in ["/users/1", "/users/2", "/admin"] {
            go(&router, path);
            view.render_now(&router);
        }
        view.set_cache_limit(1);

        assert_eq!(view.cache().len(), 1);
        assert!(view.cache().contains("/admin"));
    }
}
