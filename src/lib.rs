//! # waymark
//!
//! A headless client-side routing core: nested route matching, a guard and
//! middleware navigation pipeline, and LRU retention of rendered views.
//!
//! waymark does no painting and owns no window. The host plugs in a
//! [`HistoryAdapter`] (where the address lives) and a [`view::Renderer`]
//! (how a route component becomes something on screen); the router does the
//! rest.
//!
//! ## Quick start
//!
//! ```
//! use waymark::{guard_fn, MemoryHistory, NavigateOptions, Route, Router, RouterOptions};
//!
//! let routes = vec![
//!     Route::new("/", "Home"),
//!     Route::new("/login", "Login"),
//!     Route::new("/dashboard", "DashboardLayout")
//!         .child(Route::new("/dashboard", "Overview"))
//!         .child(Route::new("/dashboard/settings", "Settings")),
//! ];
//!
//! let options = RouterOptions::new().before_each(guard_fn(|to, _from, next| async move {
//!     if to.path().starts_with("/admin") {
//!         next.redirect("/login");
//!     } else {
//!         next.proceed();
//!     }
//!     Ok(())
//! }));
//!
//! let router = Router::builder(routes, MemoryHistory::new("/"))
//!     .options(options)
//!     .build()
//!     .unwrap();
//!
//! pollster::block_on(async {
//!     router.start().await;
//!     router.navigate("/dashboard/settings", NavigateOptions::default()).await.unwrap();
//! });
//!
//! let matched = router.current_match().unwrap();
//! assert_eq!(matched.chain.len(), 2);
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pattern`] | Path patterns: params, optional and wildcard segments |
//! | [`matching`] | Nested resolution over the route tree |
//! | [`middleware`] | Per-route onion middleware |
//! | [`guards`] | Global pre-navigate, pre-resolve and post-navigate guards |
//! | [`router`] | The navigation engine |
//! | [`history`] | History adapters |
//! | [`cache`] | LRU view retention and cache eligibility |
//! | [`view`] | Rendering the current route |
//! | [`session`] | The active-router registry |
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `log` | yes | Log through the `log` crate |
//! | `tracing` | no | Log through the `tracing` crate |

mod logging;

pub mod cache;
pub mod error;
pub mod guards;
pub mod history;
pub mod lifecycle;
pub mod location;
pub mod matching;
pub mod middleware;
pub mod options;
pub mod params;
pub mod pattern;
pub mod route;
pub mod router;
pub mod session;
pub mod subscription;
pub mod view;

pub use cache::{CachePolicy, CacheRules, CacheSetting, ViewCache};
pub use error::{ConfigError, NavigationPhase, NavigationResult, RouterError};
pub use guards::{
    after_fn, guard_fn, AfterGuard, GuardContext, GuardManager, GuardNext, GuardSequenceResult,
    RouteGuard,
};
pub use history::{HashHistory, HistoryAdapter, MemoryHistory};
pub use lifecycle::{NavigationAction, NavigationState};
pub use location::{Fragment, Location};
pub use matching::{RouteMatch, RouteTree};
pub use middleware::{middleware_fn, Middleware, MiddlewareChain, MiddlewareContext, Next};
pub use options::RouterOptions;
pub use params::{ParamValue, QueryParams, QueryUpdate, RouteParams};
pub use pattern::{MatchOptions, MatchOverrides, PathPattern};
pub use route::{DeferredView, Meta, Route, RouteNode, ViewRef};
pub use router::{NavigateOptions, NavigationTarget, PushOptions, Router, MAX_REDIRECT_DEPTH};
pub use session::Session;
pub use subscription::Subscription;
pub use view::{Renderer, RouterView};
