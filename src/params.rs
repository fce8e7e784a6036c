//! Route parameters and query string handling.
//!
//! - [`RouteParams`] holds values bound by a route pattern. A value is either
//!   a single segment ([`ParamValue::Single`]) or, for `**` wildcards, the
//!   list of segments it swallowed ([`ParamValue::Multi`]).
//! - [`QueryParams`] holds the decoded `?key=value&...` part of a location.
//!   Keys may repeat (`?tag=a&tag=b`) and insertion order is preserved.
//!
//! # Example
//!
//! ```
//! use waymark::{QueryParams, RouteParams};
//!
//! let mut params = RouteParams::new();
//! params.insert("id", "42");
//! assert_eq!(params.get_as::<u32>("id"), Some(42));
//!
//! let query = QueryParams::from_query_string("page=1&sort=name");
//! assert_eq!(query.get_as::<u32>("page"), Some(1));
//! assert_eq!(query.get("sort"), Some("name"));
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// ParamValue
// ============================================================================

/// A value bound by a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    /// One path segment (`:id`, `*`).
    Single(String),
    /// Every segment swallowed by a `**` wildcard.
    Multi(Vec<String>),
}

impl ParamValue {
    /// The value as a single string slice, if it is [`ParamValue::Single`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Multi(_) => None,
        }
    }

    /// The value as segments. A single value is one segment.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(value) => vec![value.as_str()],
            ParamValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Join the value back into path form.
    pub fn to_path(&self) -> Cow<'_, str> {
        match self {
            ParamValue::Single(value) => Cow::Borrowed(value),
            ParamValue::Multi(values) => Cow::Owned(values.join("/")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Multi(values)
    }
}

// ============================================================================
// RouteParams
// ============================================================================

/// Parameters bound while matching a location against a route chain.
///
/// # Example
///
/// ```
/// use waymark::{ParamValue, RouteParams};
///
/// let mut params = RouteParams::new();
/// params.insert("id", "123");
/// params.insert("splat", ParamValue::Multi(vec!["a".into(), "b".into()]));
///
/// assert_eq!(params.get_str("id"), Some("123"));
/// assert_eq!(params.get("splat").map(|v| v.to_string()), Some("a/b".to_string()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    params: HashMap<String, ParamValue>,
}

impl RouteParams {
    /// Create empty route parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Get a single-segment parameter as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.as_str()
    }

    /// Get a parameter and parse it as a specific type.
    ///
    /// Returns `None` if the parameter is missing, is a multi-segment value,
    /// or cannot be parsed.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get_str(key)?.parse().ok()
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(key.into(), value.into());
    }

    /// Remove a parameter, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.params.remove(key)
    }

    /// Return `true` if the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterate over all `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.params.iter()
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Return the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Merge parameters bound at an ancestor with those bound deeper.
    ///
    /// The deeper value wins when both levels bind the same key.
    ///
    /// ```
    /// use waymark::RouteParams;
    ///
    /// let mut parent = RouteParams::new();
    /// parent.insert("workspaceId", "123");
    /// parent.insert("view", "list");
    ///
    /// let mut child = RouteParams::new();
    /// child.insert("view", "grid");
    ///
    /// let merged = RouteParams::merge(&parent, &child);
    /// assert_eq!(merged.get_str("workspaceId"), Some("123"));
    /// assert_eq!(merged.get_str("view"), Some("grid"));
    /// ```
    pub fn merge(parent: &RouteParams, child: &RouteParams) -> RouteParams {
        let mut merged = parent.clone();
        merged.extend(child);
        merged
    }

    /// Fold `other` into `self`, overwriting existing keys.
    pub fn extend(&mut self, other: &RouteParams) {
        for (key, value) in other.iter() {
            self.params.insert(key.clone(), value.clone());
        }
    }

    /// Combine current parameters with new ones for a push/replace call.
    ///
    /// With `replace` set the new parameters are taken as-is; otherwise they
    /// are folded over the current ones.
    pub fn merge_with(current: &RouteParams, new: &RouteParams, replace: bool) -> RouteParams {
        if replace {
            new.clone()
        } else {
            RouteParams::merge(current, new)
        }
    }
}

impl<K, V> FromIterator<(K, V)> for RouteParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = RouteParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

// ============================================================================
// QueryParams
// ============================================================================

/// Query parameters parsed from a URL query string.
///
/// Supports multiple values for the same key and keeps keys in the order
/// they first appeared.
///
/// ```
/// use waymark::QueryParams;
///
/// let query = QueryParams::from_query_string("?page=1&tag=rust&tag=async");
///
/// assert_eq!(query.get("page"), Some("1"));
/// assert_eq!(query.get_all("tag").map(|v| v.len()), Some(2));
/// assert_eq!(query.to_query_string(), "page=1&tag=rust&tag=async");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    /// Create empty query parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a query string, with or without the leading `?`.
    ///
    /// `+` decodes to a space. Pairs without `=` bind an empty value.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = QueryParams::new();

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.append(decode_component(key), decode_component(value));
        }

        params
    }

    /// Get the first value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key)?.first().map(String::as_str)
    }

    /// Get all values for a key.
    pub fn get_all(&self, key: &str) -> Option<&Vec<String>> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, values)| values)
    }

    /// Get the first value for a key, parsed as type `T`.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get(key)?.parse().ok()
    }

    /// Append a value for the given key, keeping existing values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => values.push(value),
            None => self.pairs.push((key, vec![value])),
        }
    }

    /// Replace every value of `key` with `values`.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = values,
            None => self.pairs.push((key, values)),
        }
    }

    /// Remove a key and all its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let index = self.pairs.iter().position(|(existing, _)| existing == key)?;
        Some(self.pairs.remove(index).1)
    }

    /// Return `true` if the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get_all(key).is_some()
    }

    /// Fold updates into these parameters.
    ///
    /// `Some(values)` replaces the key, `None` removes it.
    pub fn apply(&mut self, updates: &QueryUpdate) {
        for (key, values) in &updates.entries {
            match values {
                Some(values) => self.set(key.clone(), values.clone()),
                None => {
                    self.remove(key);
                }
            }
        }
    }

    /// Iterate over `(key, values)` in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.pairs
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Serialize back into a query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .flat_map(|(key, values)| {
                values.iter().map(move |value| {
                    format!(
                        "{}={}",
                        urlencoding::encode(key),
                        urlencoding::encode(value)
                    )
                })
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Return the number of unique keys.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.append(key, value);
        }
        params
    }
}

// ============================================================================
// QueryUpdate
// ============================================================================

/// A set of query changes for merge-style navigation.
///
/// ```
/// use waymark::{QueryParams, QueryUpdate};
///
/// let mut query = QueryParams::from_query_string("page=2&sort=name");
/// query.apply(&QueryUpdate::new().set("page", "3").unset("sort"));
/// assert_eq!(query.to_query_string(), "page=3");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct QueryUpdate {
    entries: Vec<(String, Option<Vec<String>>)>,
}

impl QueryUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to a single value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), Some(vec![value.into()])));
        self
    }

    /// Set `key` to several values.
    pub fn set_all(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.entries.push((key.into(), Some(values)));
        self
    }

    /// Remove `key`.
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.entries.push((key.into(), None));
        self
    }

    /// Return `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Turn the update into fresh query parameters, dropping removals.
    pub fn into_query(self) -> QueryParams {
        let mut query = QueryParams::new();
        query.apply(&self);
        query
    }
}

/// Decode a query component: `+` becomes a space, then percent-decoding.
///
/// Malformed escapes are kept verbatim.
pub(crate) fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

// ============================================================================
// Tests
// ============================================================================
