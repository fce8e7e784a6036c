//! History adapters.
//!
//! The router never stores the address itself. It reads and writes it
//! through a [`HistoryAdapter`], one per navigation mode. Two in-memory
//! adapters ship with the crate:
//!
//! - [`MemoryHistory`] keeps a stack of plain paths (`/base/users?x=1`).
//! - [`HashHistory`] keeps a stack of fragments and reads the route from the
//!   part after `#`, the way fragment-mode routing does in a browser.
//!
//! `push`, `replace` and `redirect` change the address silently. Only
//! [`go`](HistoryAdapter::go) (back/forward) fires the listeners registered
//! with [`subscribe`](HistoryAdapter::subscribe), since that is the change
//! the router did not initiate.

use crate::error::RouterError;
use crate::location::{join_base, normalize_leading_slash, strip_base, Location};
use crate::subscription::Subscription;
use crate::{debug_log, trace_log};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback fired on an external location change.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// HistoryAdapter trait
// ============================================================================

/// Storage for the current address in one navigation mode.
pub trait HistoryAdapter: Send + Sync + 'static {
    /// Current location, with `base` stripped from the path.
    fn location(&self, base: &str) -> Location;

    /// Add a new entry for `path` (path, query and fragment) under `base`.
    fn push(&self, path: &str, base: &str) -> Result<(), RouterError>;

    /// Overwrite the current entry.
    fn replace(&self, path: &str, base: &str) -> Result<(), RouterError>;

    /// Apply an address change requested by middleware mid-navigation.
    fn redirect(&self, path: &str, base: &str, replace: bool) -> Result<(), RouterError> {
        if replace {
            self.replace(path, base)
        } else {
            self.push(path, base)
        }
    }

    /// Listen for changes the router did not make, such as back/forward.
    fn subscribe(&self, listener: ChangeListener) -> Subscription;

    /// Prepare the adapter before the first navigation.
    fn initialize(&self, base: &str) -> Location {
        self.location(base)
    }

    /// Move `delta` entries through history. Out-of-range moves are ignored.
    fn go(&self, delta: isize) -> Result<(), RouterError>;
}

impl<H: HistoryAdapter + ?Sized> HistoryAdapter for Arc<H> {
    fn location(&self, base: &str) -> Location {
        (**self).location(base)
    }

    fn push(&self, path: &str, base: &str) -> Result<(), RouterError> {
        (**self).push(path, base)
    }

    fn replace(&self, path: &str, base: &str) -> Result<(), RouterError> {
        (**self).replace(path, base)
    }

    fn redirect(&self, path: &str, base: &str, replace: bool) -> Result<(), RouterError> {
        (**self).redirect(path, base, replace)
    }

    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        (**self).subscribe(listener)
    }

    fn initialize(&self, base: &str) -> Location {
        (**self).initialize(base)
    }

    fn go(&self, delta: isize) -> Result<(), RouterError> {
        (**self).go(delta)
    }
}

// ============================================================================
// Shared stack and listeners
// ============================================================================

/// Entry stack with a cursor.
#[derive(Debug, Clone)]
struct Stack {
    entries: Vec<String>,
    current: usize,
}

impl Stack {
    fn new(initial: String) -> Self {
        Self {
            entries: vec![initial],
            current: 0,
        }
    }

    fn current(&self) -> &str {
        &self.entries[self.current]
    }

    /// Push, dropping any forward entries.
    fn push(&mut self, entry: String) {
        self.entries.truncate(self.current + 1);
        self.entries.push(entry);
        self.current += 1;
    }

    fn replace(&mut self, entry: String) {
        self.entries[self.current] = entry;
    }

    /// Move the cursor; returns `false` when the target is out of range.
    fn go(&mut self, delta: isize) -> bool {
        match self.current.checked_add_signed(delta) {
            Some(target) if target < self.entries.len() && delta != 0 => {
                self.current = target;
                true
            }
            _ => false,
        }
    }

    fn peek(&self, delta: isize) -> Option<&str> {
        self.current
            .checked_add_signed(delta)
            .and_then(|index| self.entries.get(index))
            .map(String::as_str)
    }
}

#[derive(Default)]
struct Listeners {
    entries: Arc<Mutex<Vec<(u64, ChangeListener)>>>,
    next_id: AtomicU64,
}

impl Listeners {
    fn add(&self, listener: ChangeListener) -> Subscription {
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

    fn notify(&self) {
        // Call outside the lock so a listener may unsubscribe itself.
        let snapshot: Vec<ChangeListener> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// MemoryHistory
// ============================================================================

/// In-memory history for tests and headless hosts.
///
/// ```
/// use waymark::{HistoryAdapter, MemoryHistory};
///
/// let history = MemoryHistory::new("/");
/// history.push("/users?page=2", "").unwrap();
/// assert_eq!(history.location("").query, "page=2");
///
/// history.go(-1).unwrap();
/// assert_eq!(history.location("").path, "/");
/// assert!(history.can_go_forward());
/// ```
pub struct MemoryHistory {
    stack: Mutex<Stack>,
    listeners: Listeners,
}

impl MemoryHistory {
    /// Start with a single entry.
    pub fn new(initial: &str) -> Self {
        Self {
            stack: Mutex::new(Stack::new(normalize_leading_slash(initial).into_owned())),
            listeners: Listeners::default(),
        }
    }

    fn stack(&self) -> std::sync::MutexGuard<'_, Stack> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All entries, oldest first, as stored (base included).
    pub fn entries(&self) -> Vec<String> {
        self.stack().entries.clone()
    }

    /// Index of the current entry.
    pub fn index(&self) -> usize {
        self.stack().current
    }

    pub fn can_go_back(&self) -> bool {
        self.stack().current > 0
    }

    pub fn can_go_forward(&self) -> bool {
        let stack = self.stack();
        stack.current + 1 < stack.entries.len()
    }

    /// Entry `back()` would land on.
    pub fn peek_back(&self) -> Option<String> {
        self.stack().peek(-1).map(str::to_string)
    }

    /// Entry `forward()` would land on.
    pub fn peek_forward(&self) -> Option<String> {
        self.stack().peek(1).map(str::to_string)
    }

    pub fn back(&self) -> Result<(), RouterError> {
        self.go(-1)
    }

    pub fn forward(&self) -> Result<(), RouterError> {
        self.go(1)
    }

    /// Number of registered change listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl HistoryAdapter for MemoryHistory {
    fn location(&self, base: &str) -> Location {
        let href = self.stack().current().to_string();
        let mut location = Location::parse(&href);
        location.path = normalize_leading_slash(strip_base(&location.path, base)).into_owned();
        location
    }

    fn push(&self, path: &str, base: &str) -> Result<(), RouterError> {
        let entry = join_base(base, path);
        trace_log!("memory history push '{}'", entry);
        self.stack().push(entry);
        Ok(())
    }

    fn replace(&self, path: &str, base: &str) -> Result<(), RouterError> {
        let entry = join_base(base, path);
        trace_log!("memory history replace '{}'", entry);
        self.stack().replace(entry);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        self.listeners.add(listener)
    }

    fn go(&self, delta: isize) -> Result<(), RouterError> {
        let moved = self.stack().go(delta);
        if moved {
            debug_log!("memory history moved by {}", delta);
            self.listeners.notify();
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack();
        f.debug_struct("MemoryHistory")
            .field("entries", &stack.entries)
            .field("current", &stack.current)
            .finish()
    }
}

// ============================================================================
// HashHistory
// ============================================================================

/// Fragment-mode history.
///
/// The route lives after `#`: an entry `#/app/users?x=1#top` reads as path
/// `/users` (with base `/app`), query `x=1`, fragment `top`. An empty
/// fragment reads as `/`.
///
/// ```
/// use waymark::{HashHistory, HistoryAdapter};
///
/// let history = HashHistory::new("");
/// let start = history.initialize("/app");
/// assert_eq!(history.href(), "#/app/");
/// assert_eq!(start.path, "/");
/// ```
pub struct HashHistory {
    stack: Mutex<Stack>,
    listeners: Listeners,
}

impl HashHistory {
    /// Start with the given fragment (with or without `#`).
    pub fn new(fragment: &str) -> Self {
        Self {
            stack: Mutex::new(Stack::new(fragment.trim_start_matches('#').to_string())),
            listeners: Listeners::default(),
        }
    }

    fn stack(&self) -> std::sync::MutexGuard<'_, Stack> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current fragment including `#`, as a browser would show it.
    pub fn href(&self) -> String {
        format!("#{}", self.stack().current())
    }

    /// All fragments, oldest first, without `#`.
    pub fn entries(&self) -> Vec<String> {
        self.stack().entries.clone()
    }
}

impl Default for HashHistory {
    fn default() -> Self {
        Self::new("")
    }
}

impl HistoryAdapter for HashHistory {
    fn location(&self, base: &str) -> Location {
        let fragment = self.stack().current().to_string();
        let route = if fragment.is_empty() { "/" } else { fragment.as_str() };
        let mut location = Location::parse(route);
        location.path = normalize_leading_slash(strip_base(&location.path, base)).into_owned();
        location
    }

    fn push(&self, path: &str, base: &str) -> Result<(), RouterError> {
        let entry = join_base(base, path);
        trace_log!("hash history push '#{}'", entry);
        self.stack().push(entry);
        Ok(())
    }

    fn replace(&self, path: &str, base: &str) -> Result<(), RouterError> {
        let entry = join_base(base, path);
        trace_log!("hash history replace '#{}'", entry);
        self.stack().replace(entry);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        self.listeners.add(listener)
    }

    fn initialize(&self, base: &str) -> Location {
        {
            let mut stack = self.stack();
            if stack.current().is_empty() {
                let default = format!("{}/", base.trim_end_matches('/'));
                debug_log!("hash history defaulting empty fragment to '#{}'", default);
                stack.replace(default);
            }
        }
        self.location(base)
    }

    fn go(&self, delta: isize) -> Result<(), RouterError> {
        let moved = self.stack().go(delta);
        if moved {
            debug_log!("hash history moved by {}", delta);
            self.listeners.notify();
        }
        Ok(())
    }
}

impl fmt::Debug for HashHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashHistory")
            .field("href", &self.href())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
