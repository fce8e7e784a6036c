//! Location snapshots and URL helpers.
//!
//! A [`Location`] is the router's view of "where we are": a path, a raw
//! query string and a raw fragment, each stored without its `?`/`#` marker.
//! Locations are plain values; the router hands out clones and never
//! mutates one that a subscriber has seen.

use crate::error::RouterError;
use crate::params::{QueryParams, RouteParams};
use crate::pattern::PathPattern;
use crate::warn_log;
use std::borrow::Cow;
use std::fmt;

// ============================================================================
// Location
// ============================================================================

/// Snapshot of the current address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    /// Path component, always starting with `/` once normalized.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: String,
    /// Fragment without the leading `#`.
    pub fragment: String,
}

impl Location {
    /// Build a location from its parts.
    pub fn new(path: impl Into<String>, query: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
            fragment: fragment.into(),
        }
    }

    /// Split a URL-like string into path, query and fragment.
    ///
    /// The fragment is split off first, so a `?` inside the fragment stays
    /// part of it.
    ///
    /// ```
    /// use waymark::Location;
    ///
    /// let loc = Location::parse("/search?q=rust#results?page=2");
    /// assert_eq!(loc.path, "/search");
    /// assert_eq!(loc.query, "q=rust");
    /// assert_eq!(loc.fragment, "results?page=2");
    /// ```
    pub fn parse(url: &str) -> Self {
        let (rest, fragment) = url.split_once('#').unwrap_or((url, ""));
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        Self::new(path, query, fragment)
    }

    /// Join the parts back into `path?query#fragment`, omitting empty parts.
    pub fn href(&self) -> String {
        let mut href = self.path.clone();
        if !self.query.is_empty() {
            href.push('?');
            href.push_str(&self.query);
        }
        if !self.fragment.is_empty() {
            href.push('#');
            href.push_str(&self.fragment);
        }
        href
    }

    /// Decoded query parameters.
    pub fn query_params(&self) -> QueryParams {
        QueryParams::from_query_string(&self.query)
    }

    /// Decoded fragment parameters, see [`parse_fragment_params`].
    pub fn fragment_params(&self) -> QueryParams {
        parse_fragment_params(&self.fragment)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

// ============================================================================
// Path helpers
// ============================================================================

/// Prefix `path` with `/` unless it already starts with one.
///
/// ```
/// use waymark::location::normalize_leading_slash;
///
/// assert_eq!(normalize_leading_slash("users"), "/users");
/// assert_eq!(normalize_leading_slash("/users"), "/users");
/// assert_eq!(normalize_leading_slash(""), "/");
/// ```
pub fn normalize_leading_slash(path: &str) -> Cow<'_, str> {
    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    }
}

/// Remove the base prefix from `path`.
///
/// A path outside the base is returned untouched. Stripping the whole path
/// leaves `/`.
///
/// ```
/// use waymark::location::strip_base;
///
/// assert_eq!(strip_base("/app/users", "/app"), "/users");
/// assert_eq!(strip_base("/app", "/app"), "/");
/// assert_eq!(strip_base("/other", "/app"), "/other");
/// ```
pub fn strip_base<'a>(path: &'a str, base: &str) -> &'a str {
    if base.is_empty() {
        return path;
    }
    match path.strip_prefix(base) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Prepend the base prefix to an absolute path.
pub fn join_base(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}{}", normalize_leading_slash(path))
}

/// Parse a fragment as `key=value&...` pairs.
///
/// Only fragments containing `=` are treated as parameters; a plain anchor
/// such as `#section-2` yields nothing.
pub fn parse_fragment_params(fragment: &str) -> QueryParams {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    if fragment.contains('=') {
        QueryParams::from_query_string(fragment)
    } else {
        QueryParams::new()
    }
}

// ============================================================================
// URL building
// ============================================================================

/// Fragment part of a URL being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Raw fragment text, without `#`.
    Raw(String),
    /// Key/value pairs serialized like a query string.
    Params(QueryParams),
}

impl From<&str> for Fragment {
    fn from(value: &str) -> Self {
        Fragment::Raw(value.trim_start_matches('#').to_string())
    }
}

impl From<QueryParams> for Fragment {
    fn from(value: QueryParams) -> Self {
        Fragment::Params(value)
    }
}

/// Extra parts folded into a path by [`build_url`].
#[derive(Debug, Clone, Default)]
pub struct UrlParts<'a> {
    /// Values for `:param` and wildcard tokens in the path.
    pub params: Option<&'a RouteParams>,
    /// Query pairs appended after `?`.
    pub query: Option<&'a QueryParams>,
    /// Fragment appended after `#`.
    pub fragment: Option<&'a Fragment>,
}

/// Build a full URL from a path or pattern plus params, query and fragment.
///
/// Pattern tokens in `path` are filled from `parts.params` with
/// percent-encoded values. If the pattern cannot be filled the path is used
/// verbatim and a warning is logged.
///
/// ```
/// use waymark::location::{build_url, Fragment, UrlParts};
/// use waymark::{QueryParams, RouteParams};
///
/// let params: RouteParams = [("id", "a b")].into_iter().collect();
/// let query: QueryParams = [("tab", "info")].into_iter().collect();
/// let fragment = Fragment::from("top");
///
/// let url = build_url(
///     "/users/:id",
///     &UrlParts { params: Some(&params), query: Some(&query), fragment: Some(&fragment) },
/// );
/// assert_eq!(url, "/users/a%20b?tab=info#top");
/// ```
pub fn build_url(path: &str, parts: &UrlParts<'_>) -> String {
    let mut url = match parts.params {
        Some(params) if !params.is_empty() => fill_pattern(path, params),
        _ => path.to_string(),
    };

    if let Some(query) = parts.query.filter(|query| !query.is_empty()) {
        url.push('?');
        url.push_str(&query.to_query_string());
    }

    match parts.fragment {
        Some(Fragment::Raw(raw)) if !raw.is_empty() => {
            url.push('#');
            url.push_str(raw);
        }
        Some(Fragment::Params(pairs)) if !pairs.is_empty() => {
            url.push('#');
            url.push_str(&pairs.to_query_string());
        }
        _ => {}
    }

    url
}

fn fill_pattern(path: &str, params: &RouteParams) -> String {
    match PathPattern::new(path)
        .map_err(RouterError::from)
        .and_then(|pattern| pattern.fill(params))
    {
        Ok(filled) => filled,
        Err(err) => {
            warn_log!("could not compile path '{}' with params: {}", path, err);
            path.to_string()
        }
    }
}

/// Decode a single path segment, keeping it verbatim if it is malformed.
pub(crate) fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
