//! Test utilities shared by the integration suites
//!
//! Provides route fixtures, a call log for asserting execution order, and
//! recording guards and middleware.

#![allow(dead_code)]

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use waymark::*;

/// Component type used throughout the integration tests.
pub type Screen = &'static str;

/// Route logging to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// CallLog
// ============================================================================

/// Ordered record of calls, shareable across guards and middleware.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// `/dashboard` layout with an index child and a settings child.
pub fn dashboard_routes() -> Vec<Route<Screen>> {
    vec![
        Route::new("/", "Home"),
        Route::new("/login", "Login"),
        Route::new("/admin", "Admin"),
        Route::new("/dashboard", "DashboardLayout")
            .child(Route::new("/dashboard", "DashboardIndex"))
            .child(Route::new("/dashboard/settings", "Settings")),
    ]
}

/// Router over `routes` backed by an in-memory history starting at `initial`.
pub fn memory_router(
    routes: Vec<Route<Screen>>,
    initial: &str,
    options: RouterOptions<Screen>,
) -> (Router<Screen>, Arc<MemoryHistory>) {
    init_logging();
    let history = Arc::new(MemoryHistory::new(initial));
    let router = Router::builder(routes, Arc::clone(&history))
        .options(options)
        .build()
        .expect("router should build");
    (router, history)
}

// ============================================================================
// Recording guards and middleware
// ============================================================================

/// Guard that logs its label and lets the navigation through.
pub fn passing_guard(label: &'static str, log: &CallLog) -> impl RouteGuard {
    let log = log.clone();
    guard_fn(move |_to, _from, next| {
        let log = log.clone();
        async move {
            log.push(label);
            next.proceed();
            Ok(())
        }
    })
}

/// Guard that logs its label and redirects to `target`.
pub fn redirecting_guard(label: &'static str, target: &'static str, log: &CallLog) -> impl RouteGuard {
    let log = log.clone();
    guard_fn(move |_to, _from, next| {
        let log = log.clone();
        async move {
            log.push(label);
            next.redirect(target);
            Ok(())
        }
    })
}

/// Onion middleware that logs `label:before` and `label:after`.
pub struct Recording {
    pub label: &'static str,
    pub log: CallLog,
}

impl Middleware for Recording {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.push(format!("{}:before", self.label));
            next.proceed(ctx).await?;
            self.log.push(format!("{}:after", self.label));
            Ok::<(), anyhow::Error>(())
        })
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

pub fn recording(label: &'static str, log: &CallLog) -> Recording {
    Recording {
        label,
        log: log.clone(),
    }
}
