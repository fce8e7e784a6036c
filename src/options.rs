//! Router configuration.
//!
//! ```
//! use waymark::cache::CacheRules;
//! use waymark::{guard_fn, RouterOptions};
//!
//! let options: RouterOptions<&'static str> = RouterOptions::new()
//!     .base("/app")
//!     .cache(CacheRules::new().exclude("/admin").limit(5))
//!     .loading("Spinner")
//!     .before_each(guard_fn(|_to, _from, next| async move {
//!         next.proceed();
//!         Ok(())
//!     }));
//!
//! assert_eq!(options.base, "/app");
//! assert_eq!(options.on_pre_navigate.len(), 1);
//! ```

use crate::cache::{CacheKeyFn, CacheSetting};
use crate::guards::{AfterGuard, RouteGuard};
use crate::location::Location;
use crate::pattern::MatchOptions;
use std::fmt;
use std::sync::Arc;

/// Options recognized by [`Router::builder`](crate::Router::builder).
#[must_use]
pub struct RouterOptions<C> {
    /// Prefix under which every route lives, e.g. `/app`. Empty by default.
    pub base: String,
    /// Which locations retain their views.
    pub cache: CacheSetting,
    /// Custom cache key. Defaults to the location's path.
    pub cache_key: Option<CacheKeyFn>,
    /// Global match options; routes may override them.
    pub match_options: MatchOptions,
    /// Guards registered into the pre-navigate registry at build time.
    pub on_pre_navigate: Vec<Arc<dyn RouteGuard>>,
    /// Guards registered into the pre-resolve registry at build time.
    pub on_pre_resolve: Vec<Arc<dyn RouteGuard>>,
    /// Hooks registered into the post-navigate registry at build time.
    pub on_post_navigate: Vec<Arc<dyn AfterGuard>>,
    /// Global loading placeholder shown while a deferred view resolves.
    pub loading: Option<C>,
}

impl<C> RouterOptions<C> {
    pub fn new() -> Self {
        Self {
            base: String::new(),
            cache: CacheSetting::Off,
            cache_key: None,
            match_options: MatchOptions::default(),
            on_pre_navigate: Vec::new(),
            on_pre_resolve: Vec::new(),
            on_post_navigate: Vec::new(),
            loading: None,
        }
    }

    /// Set the base prefix. A trailing `/` is dropped.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn cache(mut self, cache: impl Into<CacheSetting>) -> Self {
        self.cache = cache.into();
        self
    }

    pub fn cache_key(mut self, key: impl Fn(&Location) -> String + Send + Sync + 'static) -> Self {
        self.cache_key = Some(Arc::new(key));
        self
    }

    pub fn match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }

    pub fn before_each(mut self, guard: impl RouteGuard) -> Self {
        self.on_pre_navigate.push(Arc::new(guard));
        self
    }

    pub fn before_resolve(mut self, guard: impl RouteGuard) -> Self {
        self.on_pre_resolve.push(Arc::new(guard));
        self
    }

    pub fn after_each(mut self, hook: impl AfterGuard) -> Self {
        self.on_post_navigate.push(Arc::new(hook));
        self
    }

    pub fn loading(mut self, component: C) -> Self {
        self.loading = Some(component);
        self
    }
}

impl<C> Default for RouterOptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: fmt::Debug> fmt::Debug for RouterOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("base", &self.base)
            .field("cache", &self.cache)
            .field("custom_cache_key", &self.cache_key.is_some())
            .field("match_options", &self.match_options)
            .field("on_pre_navigate", &self.on_pre_navigate.len())
            .field("on_pre_resolve", &self.on_pre_resolve.len())
            .field("on_post_navigate", &self.on_post_navigate.len())
            .field("loading", &self.loading)
            .finish()
    }
}
