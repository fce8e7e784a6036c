//! Navigation decisions and the navigation state machine.
//!
//! - [`NavigationAction`] is the single decision vocabulary of the pipeline.
//!   Guards hand one to their [`GuardNext`](crate::GuardNext) token, and a
//!   composed middleware chain resolves to one.
//! - [`NavigationState`] names the phase a navigation is in. The engine
//!   walks these states in order for every request:
//!
//! ```text
//! Idle -> Matching -> RunningPreNavigate -> RunningMiddleware
//!      -> RunningPreResolve -> Committing -> RunningPostNavigate -> Idle
//! ```
//!
//! A redirect re-enters `Matching` with the new target (passing through
//! `Redirecting`); a cancellation returns straight to `Idle` through
//! `Cancelled` without committing.

use std::fmt;

// ============================================================================
// NavigationAction
// ============================================================================

/// What the router should do with the navigation in flight.
///
/// # Example
///
/// ```
/// use waymark::NavigationAction;
///
/// let action = NavigationAction::deny("Not authorized");
/// assert!(action.is_deny());
///
/// let action = NavigationAction::redirect("/login");
/// assert_eq!(action.redirect_path(), Some("/login"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationAction {
    /// Proceed to the next step.
    Continue,

    /// Stop the navigation without committing anything.
    Deny {
        /// Human-readable reason, used only for logging.
        reason: String,
    },

    /// Stop this navigation and start a new one at `to`.
    Redirect {
        /// Path to redirect to.
        to: String,
        /// Optional human-readable reason for redirecting.
        reason: Option<String>,
    },
}

impl NavigationAction {
    /// Create a cancellation with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// Create a redirect to `to`.
    pub fn redirect(to: impl Into<String>) -> Self {
        Self::Redirect {
            to: to.into(),
            reason: None,
        }
    }

    /// Create a redirect with a human-readable reason.
    pub fn redirect_with_reason(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Redirect {
            to: to.into(),
            reason: Some(reason.into()),
        }
    }

    /// Check if this action lets the navigation continue.
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Check if this action cancels the navigation.
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    /// Check if this action redirects the navigation.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    /// Get the redirect path, if this is a redirect.
    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            Self::Redirect { to, .. } => Some(to.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for NavigationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Deny { reason } => write!(f, "deny ({reason})"),
            Self::Redirect { to, reason: None } => write!(f, "redirect to {to}"),
            Self::Redirect {
                to,
                reason: Some(reason),
            } => write!(f, "redirect to {to} ({reason})"),
        }
    }
}

// ============================================================================
// NavigationState
// ============================================================================

/// Phase of the navigation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NavigationState {
    /// No navigation in flight.
    #[default]
    Idle,
    /// Resolving the target against the route tree.
    Matching,
    /// Running the pre-navigate guard sequence.
    RunningPreNavigate,
    /// Running the composed middleware chain.
    RunningMiddleware,
    /// Running the pre-resolve guard sequence.
    RunningPreResolve,
    /// Applying the location to the history adapter and notifying subscribers.
    Committing,
    /// Running post-navigate guards.
    RunningPostNavigate,
    /// A redirect was requested; matching restarts with the new target.
    Redirecting,
    /// The navigation was cancelled; nothing was committed.
    Cancelled,
}

impl NavigationState {
    /// Check if a navigation is in flight.
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle | Self::Cancelled)
    }

    /// Check if `next` is a legal successor of `self`.
    ///
    /// `Idle` can be left only for `Matching`. Every running phase can end in
    /// `Cancelled` or `Redirecting`, except that redirects never originate
    /// from the post-navigate phase.
    pub fn can_transition_to(self, next: NavigationState) -> bool {
        use NavigationState::*;
        match (self, next) {
            (Idle | Cancelled, Matching) => true,
            (Matching, RunningPreNavigate) => true,
            (RunningPreNavigate, RunningMiddleware | Redirecting | Cancelled) => true,
            (RunningMiddleware, RunningPreResolve | Redirecting | Cancelled) => true,
            (RunningPreResolve, Committing | Redirecting | Cancelled) => true,
            (Committing, RunningPostNavigate) => true,
            (RunningPostNavigate, Idle) => true,
            (Redirecting, Matching) => true,
            (Cancelled, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Matching => "matching",
            Self::RunningPreNavigate => "running pre-navigate guards",
            Self::RunningMiddleware => "running middleware",
            Self::RunningPreResolve => "running pre-resolve guards",
            Self::Committing => "committing",
            Self::RunningPostNavigate => "running post-navigate guards",
            Self::Redirecting => "redirecting",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
