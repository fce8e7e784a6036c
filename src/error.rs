//! Error and outcome types for the routing core.
//!
//! Two families live here:
//!
//! - [`RouterError`]: failures that make a call return `Err`. These are
//!   configuration mistakes caught at build time, protocol violations such
//!   as calling a middleware continuation twice, redirect loops, and
//!   adapter or orchestration failures.
//! - [`NavigationResult`]: the `Ok` value of a navigation. Cancellation and
//!   "no route matched" are normal outcomes, not errors.
//!
//! Guard failures never show up as [`RouterError`]. They are contained at
//! the guard phase boundary, logged, and turned into a cancellation.
//!
//! # Examples
//!
//! ```
//! use waymark::error::{NavigationPhase, NavigationResult};
//! use waymark::Location;
//!
//! let result = NavigationResult::Committed { location: Location::parse("/home") };
//! assert!(result.is_committed());
//!
//! let cancelled = NavigationResult::Cancelled { phase: NavigationPhase::PreNavigate };
//! assert!(cancelled.is_cancelled());
//! assert_eq!(cancelled.location(), None);
//! ```

use crate::location::Location;
use std::fmt;

// ============================================================================
// RouterError
// ============================================================================

/// Errors surfaced by the router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Static configuration was rejected while building the router.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// A middleware continuation was invoked more than once.
    #[error("next() called multiple times")]
    NextCalledTwice,

    /// A chain of redirects exceeded the allowed depth.
    #[error("redirect limit of {limit} exceeded while navigating to '{path}'")]
    RedirectLimit {
        /// Target of the redirect that tripped the limit.
        path: String,
        /// Maximum number of redirects per navigation.
        limit: usize,
    },

    /// A path pattern could not be filled because a required parameter is missing.
    #[error("missing parameter '{name}' for pattern '{pattern}'")]
    MissingParam {
        /// The pattern being filled.
        pattern: String,
        /// Name of the missing parameter.
        name: String,
    },

    /// The history adapter could not apply a location change.
    #[error("history adapter failure: {0}")]
    Adapter(String),

    /// The router was disposed and no longer accepts navigations.
    #[error("router has been disposed")]
    Disposed,

    /// No router is registered as the active session.
    #[error("no active router session")]
    NoActiveRouter,

    /// A middleware returned its own failure.
    #[error("middleware '{name}' failed: {source}")]
    Middleware {
        /// Name reported by the failing middleware.
        name: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Invalid static configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Cache rules supplied both `include` and `exclude`.
    #[error("cache.include and cache.exclude cannot be used together. They are mutually exclusive")]
    IncludeExcludeConflict,

    /// A route pattern could not be compiled.
    #[error("invalid route pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What went wrong.
        message: String,
    },
}

// ============================================================================
// NavigationResult
// ============================================================================

/// Phase of the navigation pipeline that stopped a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationPhase {
    /// The pre-navigate guard sequence.
    PreNavigate,
    /// The route middleware chain.
    Middleware,
    /// The pre-resolve guard sequence.
    PreResolve,
}

impl fmt::Display for NavigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationPhase::PreNavigate => write!(f, "pre-navigate"),
            NavigationPhase::Middleware => write!(f, "middleware"),
            NavigationPhase::PreResolve => write!(f, "pre-resolve"),
        }
    }
}

/// Outcome of a navigation that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationResult {
    /// The location was committed and a route matched it.
    Committed { location: Location },
    /// The location was committed but no route matched it.
    NotFound { location: Location },
    /// A guard or middleware cancelled the navigation. Nothing was committed.
    Cancelled { phase: NavigationPhase },
    /// A history move was out of range; nothing ran.
    Unchanged { location: Location },
}

impl NavigationResult {
    /// Check if the navigation committed a matched route.
    pub fn is_committed(&self) -> bool {
        matches!(self, NavigationResult::Committed { .. })
    }

    /// Check if the navigation committed a location with no matching route.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NavigationResult::NotFound { .. })
    }

    /// Check if the navigation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NavigationResult::Cancelled { .. })
    }

    /// The committed location, if anything was committed.
    pub fn location(&self) -> Option<&Location> {
        match self {
            NavigationResult::Committed { location } | NavigationResult::NotFound { location } => {
                Some(location)
            }
            NavigationResult::Cancelled { .. } | NavigationResult::Unchanged { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = RouterError::from(ConfigError::IncludeExcludeConflict);
        assert_eq!(
            err.to_string(),
            "cache.include and cache.exclude cannot be used together. They are mutually exclusive"
        );
    }

    #[test]
    fn test_next_called_twice_display() {
        assert_eq!(
            RouterError::NextCalledTwice.to_string(),
            "next() called multiple times"
        );
    }

    #[test]
    fn test_redirect_limit_display() {
        let err = RouterError::RedirectLimit {
            path: "/loop".to_string(),
            limit: 5,
        };
        assert_eq!(
            err.to_string(),
            "redirect limit of 5 exceeded while navigating to '/loop'"
        );
    }

    #[test]
    fn test_middleware_error_keeps_source() {
        let err = RouterError::Middleware {
            name: "Audit",
            source: anyhow::anyhow!("disk full").into(),
        };
        assert_eq!(err.to_string(), "middleware 'Audit' failed: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_navigation_result_helpers() {
        let committed = NavigationResult::Committed {
            location: Location::parse("/users"),
        };
        assert!(committed.is_committed());
        assert!(!committed.is_not_found());
        assert_eq!(committed.location().map(|l| l.path.as_str()), Some("/users"));

        let missing = NavigationResult::NotFound {
            location: Location::parse("/nope"),
        };
        assert!(missing.is_not_found());
        assert!(missing.location().is_some());

        let cancelled = NavigationResult::Cancelled {
            phase: NavigationPhase::Middleware,
        };
        assert!(cancelled.is_cancelled());
        assert!(cancelled.location().is_none());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(NavigationPhase::PreNavigate.to_string(), "pre-navigate");
        assert_eq!(NavigationPhase::PreResolve.to_string(), "pre-resolve");
    }
}
