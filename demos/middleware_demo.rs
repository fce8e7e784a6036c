//! Middleware Demo
//!
//! Shows onion ordering across a nested route chain, a middleware that
//! short-circuits with a redirect, and state handed from one middleware to
//! the next.

use futures::future::BoxFuture;
use serde_json::json;
use std::time::Instant;
use waymark::{
    middleware_fn, MemoryHistory, Middleware, MiddlewareContext, NavigateOptions, Next, Route,
    Router,
};

// ============================================================================
// Middleware
// ============================================================================

/// Prints how long the rest of the chain took.
struct Timing;

impl Middleware for Timing {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let started = Instant::now();
            println!("  -> timing {}", ctx.to.path);
            next.proceed(ctx).await?;
            println!("  <- timing {} ({:?})", ctx.to.path, started.elapsed());
            Ok::<(), anyhow::Error>(())
        })
    }

    fn name(&self) -> &'static str {
        "Timing"
    }
}

/// Sends requests without a `lang` query to the same path with `lang=en`.
struct RequireLocale;

impl Middleware for RequireLocale {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match ctx.query.get("lang").map(str::to_owned) {
                Some(lang) => {
                    ctx.state.insert("lang".into(), json!(lang));
                    next.proceed(ctx).await
                }
                None => next.redirect(format!("{}?lang=en", ctx.to.path)).await,
            }
        })
    }

    fn name(&self) -> &'static str {
        "RequireLocale"
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let routes = vec![
        Route::new("/", "Home"),
        Route::new("/docs", "DocsLayout")
            .middleware(Timing)
            .middleware(RequireLocale)
            .child(
                Route::new("/docs/:page", "DocPage").middleware(
                    middleware_fn(|ctx, next| {
                        Box::pin(async move {
                            println!("  page sees lang={}", ctx.state["lang"]);
                            next.proceed(ctx).await
                        })
                    })
                    .named("PageLogger"),
                ),
            ),
    ];

    let router = Router::builder(routes, MemoryHistory::new("/")).build()?;

    pollster::block_on(async {
        println!("navigate /docs/intro:");
        let result = router
            .navigate("/docs/intro", NavigateOptions::default())
            .await?;
        println!("  {:?}", result);
        println!("  landed on {}", router.location());
        Ok::<(), anyhow::Error>(())
    })
}
