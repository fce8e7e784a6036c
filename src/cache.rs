//! View retention.
//!
//! [`ViewCache`] keeps recently rendered views so their internal state
//! survives being hidden and shown again. It is an LRU map over the [`lru`]
//! crate with two deliberate quirks:
//!
//! - [`get`](ViewCache::get) promotes the entry and stamps `last_access`.
//! - [`set`](ViewCache::set) on a key that is already present only promotes
//!   it; the stored view is kept. The first view stored for a key stays until
//!   that key is evicted.
//!
//! Whether a location takes part in caching at all is decided by a
//! [`CachePolicy`], built from the router's [`CacheSetting`]. Caching is opt
//! in: `Off` by default, `On` for every path, or `Rules` with either an
//! `include` or an `exclude` list (never both).
//!
//! # Examples
//!
//! ```
//! use waymark::cache::ViewCache;
//! use waymark::Location;
//!
//! let mut cache = ViewCache::new(2);
//! cache.set("/a", "view-a", Location::parse("/a"));
//! cache.set("/b", "view-b", Location::parse("/b"));
//! cache.get("/a");
//! cache.set("/c", "view-c", Location::parse("/c"));
//!
//! assert!(cache.contains("/a"));
//! assert!(!cache.contains("/b"));
//! assert_eq!(cache.stats().evictions, 1);
//! ```

use crate::error::ConfigError;
use crate::location::Location;
use crate::{debug_log, trace_log};
use lru::LruCache;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Entry limit used when the setting does not give one.
pub const DEFAULT_CACHE_LIMIT: usize = 10;

/// Computes the cache key of a location.
pub type CacheKeyFn = Arc<dyn Fn(&Location) -> String + Send + Sync>;

/// The default cache key: the location's path.
pub fn default_cache_key(location: &Location) -> String {
    location.path.clone()
}

// ============================================================================
// ViewCache
// ============================================================================

/// A retained view.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub view: V,
    /// Last time the entry was read or re-set.
    pub last_access: Instant,
    /// Location the view was first rendered for.
    pub source: Location,
}

/// Counters tracking cache effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Entries dropped to stay within the limit.
    pub evictions: usize,
    /// Number of full invalidations (via [`ViewCache::clear`]).
    pub invalidations: usize,
}

impl CacheStats {
    /// Return the hit rate as a value in `0.0..=1.0`.
    ///
    /// Returns `0.0` if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU map from cache key to retained view.
pub struct ViewCache<V> {
    entries: LruCache<String, CacheEntry<V>>,
    max_entries: usize,
    stats: CacheStats,
}

impl<V> ViewCache<V> {
    /// Create a cache holding at most `max_entries` views.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries,
            stats: CacheStats::default(),
        }
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = Instant::now();
                self.stats.hits += 1;
                trace_log!("view cache hit for '{}'", key);
                Some(&*entry)
            }
            None => {
                self.stats.misses += 1;
                trace_log!("view cache miss for '{}'", key);
                None
            }
        }
    }

    /// Look up `key` without touching recency or stats.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    /// Store `view` under `key` unless the key is already present.
    ///
    /// Returns `true` if a new entry was inserted. An existing entry is only
    /// promoted; its view is left as is.
    pub fn set(&mut self, key: impl Into<String>, view: V, source: Location) -> bool {
        let key = key.into();
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.last_access = Instant::now();
            trace_log!("view cache already holds '{}'; promoted", key);
            return false;
        }

        debug_log!("view cache insert '{}'", key);
        self.entries.put(
            key.clone(),
            CacheEntry {
                key,
                view,
                last_access: Instant::now(),
                source,
            },
        );
        self.evict_overflow();
        true
    }

    /// Drop one key.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.pop(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Change the limit, evicting right away if the cache is now too big.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
        self.evict_overflow();
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Drop every entry and count an invalidation.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += 1;
        debug_log!(
            "view cache cleared: {} entries removed ({} invalidations, hit rate: {:.1}%)",
            removed,
            self.stats.invalidations,
            self.stats.hit_rate() * 100.0
        );
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Reset all counters in [`CacheStats`] to zero.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_entries {
            let Some((key, _)) = self.entries.pop_lru() else {
                break;
            };
            self.stats.evictions += 1;
            debug_log!("view cache evicted '{}'", key);
        }
    }
}

impl<V> Default for ViewCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIMIT)
    }
}

impl<V> fmt::Debug for ViewCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCache")
            .field("keys", &self.keys())
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats)
            .finish()
    }
}

// ============================================================================
// Eligibility
// ============================================================================

/// A path test used by cache rules.
#[derive(Debug, Clone)]
pub enum PathRule {
    /// Matches one path exactly.
    Exact(String),
    /// Matches any path the regex finds a match in.
    Pattern(Regex),
}

impl PathRule {
    /// Compile a regex rule.
    pub fn pattern(source: &str) -> Result<Self, ConfigError> {
        Regex::new(source)
            .map(PathRule::Pattern)
            .map_err(|err| ConfigError::InvalidPattern {
                pattern: source.to_string(),
                message: err.to_string(),
            })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathRule::Exact(exact) => exact == path,
            PathRule::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl From<&str> for PathRule {
    fn from(value: &str) -> Self {
        PathRule::Exact(value.to_string())
    }
}

impl From<String> for PathRule {
    fn from(value: String) -> Self {
        PathRule::Exact(value)
    }
}

impl From<Regex> for PathRule {
    fn from(value: Regex) -> Self {
        PathRule::Pattern(value)
    }
}

impl PartialEq for PathRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PathRule::Exact(a), PathRule::Exact(b)) => a == b,
            (PathRule::Pattern(a), PathRule::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Rule-based cache configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheRules {
    /// Entry limit; [`DEFAULT_CACHE_LIMIT`] when `None`.
    pub limit: Option<usize>,
    /// Only these paths are cached.
    pub include: Vec<PathRule>,
    /// Every path except these is cached.
    pub exclude: Vec<PathRule>,
}

impl CacheRules {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn include(mut self, rule: impl Into<PathRule>) -> Self {
        self.include.push(rule.into());
        self
    }

    #[must_use]
    pub fn exclude(mut self, rule: impl Into<PathRule>) -> Self {
        self.exclude.push(rule.into());
        self
    }
}

/// How the router caches views.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CacheSetting {
    /// No caching.
    #[default]
    Off,
    /// Cache every path, up to [`DEFAULT_CACHE_LIMIT`] views.
    On,
    /// Cache according to include or exclude rules.
    Rules(CacheRules),
}

impl From<bool> for CacheSetting {
    fn from(value: bool) -> Self {
        if value {
            CacheSetting::On
        } else {
            CacheSetting::Off
        }
    }
}

impl From<CacheRules> for CacheSetting {
    fn from(value: CacheRules) -> Self {
        CacheSetting::Rules(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Eligibility {
    Nothing,
    Everything,
    Include(Vec<PathRule>),
    Exclude(Vec<PathRule>),
}

/// Validated cache setting.
///
/// ```
/// use waymark::cache::{CachePolicy, CacheRules, CacheSetting};
///
/// let policy = CachePolicy::from_setting(&CacheRules::new().include("/dashboard").into()).unwrap();
/// assert!(policy.should_cache("/dashboard"));
/// assert!(!policy.should_cache("/other"));
///
/// let conflict = CacheSetting::Rules(CacheRules::new().include("/a").exclude("/b"));
/// assert!(CachePolicy::from_setting(&conflict).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    eligibility: Eligibility,
    limit: usize,
}

impl CachePolicy {
    /// Validate a setting. Supplying both `include` and `exclude` is an error.
    pub fn from_setting(setting: &CacheSetting) -> Result<Self, ConfigError> {
        let (eligibility, limit) = match setting {
            CacheSetting::Off => (Eligibility::Nothing, DEFAULT_CACHE_LIMIT),
            CacheSetting::On => (Eligibility::Everything, DEFAULT_CACHE_LIMIT),
            CacheSetting::Rules(rules) => {
                let limit = rules.limit.unwrap_or(DEFAULT_CACHE_LIMIT);
                let eligibility = match (rules.include.is_empty(), rules.exclude.is_empty()) {
                    (false, false) => return Err(ConfigError::IncludeExcludeConflict),
                    (false, true) => Eligibility::Include(rules.include.clone()),
                    (true, false) => Eligibility::Exclude(rules.exclude.clone()),
                    (true, true) => Eligibility::Nothing,
                };
                (eligibility, limit)
            }
        };

        let eligibility = if limit == 0 {
            Eligibility::Nothing
        } else {
            eligibility
        };
        Ok(Self { eligibility, limit })
    }

    /// A policy that never caches.
    pub fn disabled() -> Self {
        Self {
            eligibility: Eligibility::Nothing,
            limit: DEFAULT_CACHE_LIMIT,
        }
    }

    /// Check if caching is on at all.
    pub fn is_enabled(&self) -> bool {
        self.eligibility != Eligibility::Nothing
    }

    /// Maximum number of retained views.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Check if views for `path` should be retained.
    pub fn should_cache(&self, path: &str) -> bool {
        match &self.eligibility {
            Eligibility::Nothing => false,
            Eligibility::Everything => true,
            Eligibility::Include(rules) => rules.iter().any(|rule| rule.matches(path)),
            Eligibility::Exclude(rules) => !rules.iter().any(|rule| rule.matches(path)),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(path: &str) -> Location {
        Location::parse(path)
    }

    #[test]
    fn test_cache_creation() {
        let cache: ViewCache<u32> = ViewCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.max_entries(), DEFAULT_CACHE_LIMIT);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = ViewCache::new(3);
        assert!(cache.get("/a").is_none());
        cache.set("/a", 1, loc("/a"));
        assert_eq!(cache.get("/a").map(|e| e.view), Some(1));

        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = ViewCache::new(3);
        cache.set("A", 'a', loc("/a"));
        cache.set("B", 'b', loc("/b"));
        cache.set("C", 'c', loc("/c"));
        cache.get("A");
        cache.set("D", 'd', loc("/d"));

        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
        assert!(cache.contains("C"));
        assert!(cache.contains("D"));
        assert_eq!(cache.keys(), vec!["D", "A", "C"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_set_existing_keeps_first_view() {
        let mut cache = ViewCache::new(2);
        assert!(cache.set("/a", "first", loc("/a")));
        cache.set("/b", "b", loc("/b"));
        assert!(!cache.set("/a", "second", loc("/a?x=1")));

        let entry = cache.peek("/a").unwrap();
        assert_eq!(entry.view, "first");
        assert_eq!(entry.source, loc("/a"));
        // re-set promoted "/a", so "/b" goes first
        cache.set("/c", "c", loc("/c"));
        assert!(!cache.contains("/b"));
    }

    #[test]
    fn test_get_updates_last_access() {
        let mut cache = ViewCache::new(1);
        cache.set("/a", (), loc("/a"));
        let before = cache.peek("/a").unwrap().last_access;
        let after = cache.get("/a").unwrap().last_access;
        assert!(after >= before);
    }

    #[test]
    fn test_shrinking_limit_evicts() {
        let mut cache = ViewCache::new(3);
        cache.set("/a", 1, loc("/a"));
        cache.set("/b", 2, loc("/b"));
        cache.set("/c", 3, loc("/c"));

        cache.set_max_entries(1);

        assert_eq!(cache.keys(), vec!["/c"]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_clear_counts_invalidation() {
        let mut cache = ViewCache::new(3);
        cache.set("/a", 1, loc("/a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_policy_off_and_on() {
        let off = CachePolicy::from_setting(&CacheSetting::Off).unwrap();
        assert!(!off.is_enabled());
        assert!(!off.should_cache("/a"));

        let on = CachePolicy::from_setting(&true.into()).unwrap();
        assert!(on.should_cache("/anything"));
        assert_eq!(on.limit(), DEFAULT_CACHE_LIMIT);
    }

    #[test]
    fn test_policy_rules_without_lists_is_disabled() {
        let policy = CachePolicy::from_setting(&CacheRules::new().limit(5).into()).unwrap();
        assert!(!policy.is_enabled());
        assert_eq!(policy.limit(), 5);
    }

    #[test]
    fn test_policy_include() {
        let policy = CachePolicy::from_setting(&CacheRules::new().include("/dashboard").into()).unwrap();
        assert!(policy.should_cache("/dashboard"));
        assert!(!policy.should_cache("/other"));
    }

    #[test]
    fn test_policy_exclude() {
        let policy = CachePolicy::from_setting(&CacheRules::new().exclude("/admin").into()).unwrap();
        assert!(policy.should_cache("/other"));
        assert!(!policy.should_cache("/admin"));
    }

    #[test]
    fn test_policy_conflict_is_error() {
        let setting = CacheSetting::Rules(CacheRules::new().include("/a").exclude("/b"));
        assert_eq!(
            CachePolicy::from_setting(&setting),
            Err(ConfigError::IncludeExcludeConflict)
        );
    }

    #[test]
    fn test_policy_regex_rule() {
        let rule = PathRule::pattern(r"^/users/\d+$").unwrap();
        let policy = CachePolicy::from_setting(&CacheRules::new().include(rule).into()).unwrap();
        assert!(policy.should_cache("/users/42"));
        assert!(!policy.should_cache("/users/me"));
    }

    #[test]
    fn test_zero_limit_disables() {
        let policy = CachePolicy::from_setting(&CacheRules::new().limit(0).exclude("/x").into()).unwrap();
        assert!(!policy.is_enabled());
    }

    #[test]
    fn test_bad_regex_rule() {
        assert!(matches!(
            PathRule::pattern("("),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_default_cache_key_is_path() {
        assert_eq!(default_cache_key(&loc("/a?x=1#f")), "/a");
    }
}
