//! Route Guards Demo
//!
//! Headless walk through an authentication guard: protected routes carry
//! `requiresAuth` meta, and a global pre-navigate guard bounces signed-out
//! users to `/login`. Run with `RUST_LOG=debug` to see the pipeline.

use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use waymark::{
    after_fn, guard_fn, MemoryHistory, NavigateOptions, Route, Router, RouterOptions,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let signed_in = Arc::new(AtomicBool::new(false));

    let routes = vec![
        Route::new("/", "Home").name("home"),
        Route::new("/login", "Login").name("login"),
        Route::new("/account", "AccountLayout")
            .meta("requiresAuth", json!(true))
            .child(Route::new("/account", "Profile").meta("requiresAuth", json!(true)))
            .child(Route::new("/account/billing", "Billing").meta("requiresAuth", json!(true))),
    ];

    let auth = Arc::clone(&signed_in);
    let options = RouterOptions::new()
        .before_each(guard_fn(move |to, _from, next| {
            let allowed = auth.load(Ordering::SeqCst);
            async move {
                let protected = to.meta.get("requiresAuth") == Some(&json!(true));
                if protected && !allowed {
                    next.redirect("/login");
                } else {
                    next.proceed();
                }
                Ok(())
            }
        }))
        .after_each(after_fn(|to, from| async move {
            println!("  visited {} (from {})", to.path(), from.path());
            Ok(())
        }));

    let router = Router::builder(routes, MemoryHistory::new("/"))
        .options(options)
        .build()?;

    pollster::block_on(async {
        router.start().await;

        println!("signed out:");
        router
            .navigate("/account/billing", NavigateOptions::default())
            .await?;
        println!("  landed on {}", router.location());

        signed_in.store(true, Ordering::SeqCst);
        println!("signed in:");
        router
            .navigate("/account/billing", NavigateOptions::default())
            .await?;
        println!("  landed on {}", router.location());

        Ok::<(), anyhow::Error>(())
    })
}
