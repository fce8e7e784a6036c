//! Route pattern compilation and matching.
//!
//! # Pattern syntax
//!
//! | Syntax   | Meaning                                   | Binds                      |
//! |----------|-------------------------------------------|----------------------------|
//! | `users`  | literal text                              | nothing                    |
//! | `:id`    | required segment                          | `id`                       |
//! | `:id?`   | optional segment, with its leading `/`    | `id` when present          |
//! | `*`      | one segment, numbered left to right       | `splat1`, `splat2`, ...    |
//! | `**`     | the rest of the path, one or more segments| `splat` (as segments)      |
//! | `{...}`  | optional group                            | whatever the group binds   |
//! | `\x`     | escaped literal character                 | nothing                    |
//!
//! Patterns are normalized before compiling: `/**` becomes `/*splat`, every
//! remaining bare `/*` becomes `/:splatN`, and `/:name?` becomes
//! `{/:name}`. The normalized form is compiled to a [`regex::Regex`] per
//! distinct [`MatchOptions`] value and memoized on the pattern.
//!
//! # Example
//!
//! ```
//! use waymark::pattern::{match_path, MatchOptions};
//!
//! let params = match_path("/users/:id", "/users/42", &MatchOptions::default()).unwrap();
//! assert_eq!(params.get_str("id"), Some("42"));
//!
//! assert!(match_path("/users/:id", "/users", &MatchOptions::default()).is_none());
//! ```

use crate::error::{ConfigError, RouterError};
use crate::location::decode_segment;
use crate::params::{ParamValue, RouteParams};
use crate::{error_log, trace_log};
use regex::Regex;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::{Mutex, PoisonError};

// ============================================================================
// MatchOptions
// ============================================================================

/// Options controlling how a pattern is matched against a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchOptions {
    /// Literal text must match case exactly.
    pub case_sensitive: bool,
    /// Disallow the optional trailing delimiter.
    pub strict: bool,
    /// The pattern must consume the whole path.
    pub match_to_end: bool,
    /// The pattern must match at the start of the path. When false, leading
    /// segments are dropped one at a time until a match is found.
    pub match_from_start: bool,
    /// Segment delimiter.
    pub delimiter: char,
    /// Percent-decode bound values.
    pub decode_params: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict: false,
            match_to_end: true,
            match_from_start: true,
            delimiter: '/',
            decode_params: true,
        }
    }
}

impl MatchOptions {
    /// The same options with `match_to_end` off, for matching a parent
    /// route as a prefix before descending into its children.
    pub fn prefix(self) -> Self {
        Self {
            match_to_end: false,
            ..self
        }
    }

    /// Apply per-route overrides on top of these options.
    pub fn merged(self, overrides: &MatchOverrides) -> Self {
        Self {
            case_sensitive: overrides.case_sensitive.unwrap_or(self.case_sensitive),
            strict: overrides.strict.unwrap_or(self.strict),
            match_to_end: overrides.match_to_end.unwrap_or(self.match_to_end),
            match_from_start: overrides.match_from_start.unwrap_or(self.match_from_start),
            delimiter: overrides.delimiter.unwrap_or(self.delimiter),
            decode_params: overrides.decode_params.unwrap_or(self.decode_params),
        }
    }
}

/// Per-route overrides of the router-wide [`MatchOptions`].
///
/// ```
/// use waymark::pattern::{MatchOptions, MatchOverrides};
///
/// let opts = MatchOptions::default().merged(&MatchOverrides::new().case_sensitive(true));
/// assert!(opts.case_sensitive);
/// assert!(opts.match_to_end);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[must_use]
pub struct MatchOverrides {
    pub case_sensitive: Option<bool>,
    pub strict: Option<bool>,
    pub match_to_end: Option<bool>,
    pub match_from_start: Option<bool>,
    pub delimiter: Option<char>,
    pub decode_params: Option<bool>,
}

impl MatchOverrides {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.case_sensitive = Some(value);
        self
    }

    pub fn strict(mut self, value: bool) -> Self {
        self.strict = Some(value);
        self
    }

    pub fn match_to_end(mut self, value: bool) -> Self {
        self.match_to_end = Some(value);
        self
    }

    pub fn match_from_start(mut self, value: bool) -> Self {
        self.match_from_start = Some(value);
        self
    }

    pub fn delimiter(mut self, value: char) -> Self {
        self.delimiter = Some(value);
        self
    }

    pub fn decode_params(mut self, value: bool) -> Self {
        self.decode_params = Some(value);
        self
    }
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param(String),
    Wildcard(String),
    Optional(Vec<Token>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Segment,
    Rest,
}

// ============================================================================
// PathPattern
// ============================================================================

/// A parsed route pattern.
///
/// Parsing happens once in [`PathPattern::new`]; the regex for each options
/// value is compiled on first use and reused afterwards.
#[derive(Debug)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
    keys: Vec<(String, KeyKind)>,
    compiled: Mutex<HashMap<MatchOptions, Regex>>,
}

impl Clone for PathPattern {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            tokens: self.tokens.clone(),
            keys: self.keys.clone(),
            compiled: Mutex::new(HashMap::new()),
        }
    }
}

impl PathPattern {
    /// Parse a pattern.
    ///
    /// Fails on unbalanced braces, a trailing escape, or a `:`/`*` with no
    /// parameter name.
    pub fn new(source: impl Into<String>) -> Result<Self, ConfigError> {
        let source = source.into();
        let normalized = normalize(&source);
        let mut chars = normalized.chars().peekable();
        let tokens = parse_group(&mut chars, &source, false)?;

        let mut keys = Vec::new();
        collect_keys(&tokens, &mut keys);

        let pattern = Self {
            source,
            tokens,
            keys,
            compiled: Mutex::new(HashMap::new()),
        };
        pattern.regex(&MatchOptions::default())?;
        Ok(pattern)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the parameters this pattern can bind, left to right.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(name, _)| name.as_str())
    }

    /// Match `path` against this pattern.
    ///
    /// Returns the bound parameters, or `None` when the path does not match.
    pub fn matches(&self, path: &str, options: &MatchOptions) -> Option<RouteParams> {
        if self.source.is_empty() && path.is_empty() {
            return None;
        }

        if self.source == "/*" {
            let rest = path.strip_prefix('/').unwrap_or(path);
            let mut params = RouteParams::new();
            params.insert("splat1", rest);
            return Some(params);
        }

        if self.source == "/" && !options.match_to_end {
            return path.starts_with('/').then(RouteParams::new);
        }

        let direct = self.exec(path, options);
        if direct.is_some() || options.match_from_start {
            return direct;
        }

        let segments: Vec<&str> = path
            .split(options.delimiter)
            .filter(|segment| !segment.is_empty())
            .collect();
        (1..segments.len()).find_map(|skip| {
            let candidate = format!(
                "{}{}",
                options.delimiter,
                segments[skip..].join(&options.delimiter.to_string())
            );
            self.exec(&candidate, options)
        })
    }

    /// Substitute `params` into the pattern, percent-encoding each value.
    ///
    /// Optional groups are emitted only when every parameter inside them is
    /// present.
    pub fn fill(&self, params: &RouteParams) -> Result<String, RouterError> {
        let mut out = String::new();
        fill_tokens(&self.tokens, params, &mut out).map_err(|name| RouterError::MissingParam {
            pattern: self.source.clone(),
            name,
        })?;
        Ok(out)
    }

    fn exec(&self, path: &str, options: &MatchOptions) -> Option<RouteParams> {
        let regex = match self.regex(options) {
            Ok(regex) => regex,
            Err(err) => {
                error_log!("{}", err);
                return None;
            }
        };

        let Some(captures) = regex.captures(path) else {
            trace_log!("pattern '{}' rejected '{}'", self.source, path);
            return None;
        };

        let mut params = RouteParams::new();
        for (index, (name, kind)) in self.keys.iter().enumerate() {
            let Some(raw) = captures.get(index + 1) else {
                continue;
            };
            let decode = |value: &str| {
                if options.decode_params {
                    decode_segment(value)
                } else {
                    value.to_string()
                }
            };
            let value = match kind {
                KeyKind::Segment => ParamValue::Single(decode(raw.as_str())),
                KeyKind::Rest => ParamValue::Multi(
                    raw.as_str()
                        .split(options.delimiter)
                        .map(decode)
                        .collect(),
                ),
            };
            params.insert(name.clone(), value);
        }

        trace_log!("pattern '{}' matched '{}' with {:?}", self.source, path, params);
        Some(params)
    }

    fn regex(&self, options: &MatchOptions) -> Result<Regex, ConfigError> {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = compiled.get(options) {
            return Ok(regex.clone());
        }

        let source = regex_source(&self.tokens, options);
        trace_log!("compiling pattern '{}' as {}", self.source, source);
        let regex = Regex::new(&source).map_err(|err| ConfigError::InvalidPattern {
            pattern: self.source.clone(),
            message: err.to_string(),
        })?;
        compiled.insert(*options, regex.clone());
        Ok(regex)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Match `path` against `pattern` without keeping the compiled pattern.
///
/// An invalid pattern never matches.
pub fn match_path(pattern: &str, path: &str, options: &MatchOptions) -> Option<RouteParams> {
    match PathPattern::new(pattern) {
        Ok(compiled) => compiled.matches(path, options),
        Err(err) => {
            error_log!("{}", err);
            None
        }
    }
}

// ============================================================================
// Normalization and parsing
// ============================================================================

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite wildcard and optional-parameter shorthand into the core syntax.
fn normalize(pattern: &str) -> String {
    // `**` first, so its stars are not numbered as single wildcards
    let pattern = pattern.replace("/**", "/*splat");

    let mut numbered = String::with_capacity(pattern.len() + 8);
    let mut splat = 0;
    let mut rest = pattern.as_str();
    while let Some(index) = rest.find("/*") {
        numbered.push_str(&rest[..index]);
        let after = &rest[index + 2..];
        if after.starts_with("splat") {
            numbered.push_str("/*");
        } else {
            splat += 1;
            numbered.push_str(&format!("/:splat{splat}"));
        }
        rest = after;
    }
    numbered.push_str(rest);

    let mut out = String::with_capacity(numbered.len() + 4);
    let mut rest = numbered.as_str();
    while let Some(index) = rest.find("/:") {
        out.push_str(&rest[..index]);
        let after = &rest[index + 2..];
        let name_len = after.chars().take_while(|c| is_name_char(*c)).count();
        if name_len > 0 && after[name_len..].starts_with('?') {
            out.push_str("{/:");
            out.push_str(&after[..name_len]);
            out.push('}');
            rest = &after[name_len + 1..];
        } else {
            out.push_str("/:");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

fn invalid(pattern: &str, message: &str) -> ConfigError {
    ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
}

fn parse_group(
    chars: &mut Peekable<Chars<'_>>,
    pattern: &str,
    nested: bool,
) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();

    let flush = |literal: &mut String, tokens: &mut Vec<Token>| {
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(literal)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| invalid(pattern, "trailing escape character"))?;
                literal.push(escaped);
            }
            ':' | '*' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !is_name_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(invalid(pattern, "missing parameter name"));
                }
                flush(&mut literal, &mut tokens);
                tokens.push(if c == ':' {
                    Token::Param(name)
                } else {
                    Token::Wildcard(name)
                });
            }
            '{' => {
                flush(&mut literal, &mut tokens);
                let inner = parse_group(chars, pattern, true)?;
                tokens.push(Token::Optional(inner));
            }
            '}' if nested => {
                flush(&mut literal, &mut tokens);
                return Ok(tokens);
            }
            '}' => return Err(invalid(pattern, "unbalanced '}'")),
            other => literal.push(other),
        }
    }

    if nested {
        return Err(invalid(pattern, "unterminated '{'"));
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

fn collect_keys(tokens: &[Token], keys: &mut Vec<(String, KeyKind)>) {
    for token in tokens {
        match token {
            Token::Literal(_) => {}
            Token::Param(name) => keys.push((name.clone(), KeyKind::Segment)),
            Token::Wildcard(name) => keys.push((name.clone(), KeyKind::Rest)),
            Token::Optional(inner) => collect_keys(inner, keys),
        }
    }
}

fn regex_source(tokens: &[Token], options: &MatchOptions) -> String {
    let delimiter = regex::escape(&options.delimiter.to_string());
    let mut source = String::new();
    if !options.case_sensitive {
        source.push_str("(?i)");
    }
    source.push('^');
    push_tokens(tokens, &delimiter, &mut source);

    if options.match_to_end {
        if !options.strict {
            source.push_str(&format!("(?:{delimiter})?"));
        }
        source.push('$');
    } else {
        source.push_str(&format!("(?:{delimiter}|$)"));
    }
    source
}

fn push_tokens(tokens: &[Token], delimiter: &str, source: &mut String) {
    for token in tokens {
        match token {
            Token::Literal(text) => source.push_str(&regex::escape(text)),
            Token::Param(_) => source.push_str(&format!("([^{delimiter}]+?)")),
            Token::Wildcard(_) => source.push_str("(.+?)"),
            Token::Optional(inner) => {
                source.push_str("(?:");
                push_tokens(inner, delimiter, source);
                source.push_str(")?");
            }
        }
    }
}

fn fill_tokens(tokens: &[Token], params: &RouteParams, out: &mut String) -> Result<(), String> {
    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Param(name) => {
                let value = params.get(name).ok_or_else(|| name.clone())?;
                out.push_str(&urlencoding::encode(&value.to_path()));
            }
            Token::Wildcard(name) => {
                let value = params.get(name).ok_or_else(|| name.clone())?;
                let encoded: Vec<String> = value
                    .segments()
                    .iter()
                    .flat_map(|segment| segment.split('/'))
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect();
                out.push_str(&encoded.join("/"));
            }
            Token::Optional(inner) => {
                let mut group = String::new();
                if fill_tokens(inner, params, &mut group).is_ok() {
                    out.push_str(&group);
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MatchOptions {
        MatchOptions::default()
    }

    #[test]
    fn test_normalize_wildcards() {
        assert_eq!(normalize("/files/**"), "/files/*splat");
        assert_eq!(normalize("/a/*/b/*"), "/a/:splat1/b/:splat2");
        assert_eq!(normalize("/users/:id?"), "/users{/:id}");
        assert_eq!(normalize("/x/**/y/*"), "/x/*splat/y/:splat1");
    }

    #[test]
    fn test_named_params() {
        let pattern = PathPattern::new("/users/:userId/posts/:postId").unwrap();
        let params = pattern.matches("/users/7/posts/99", &opts()).unwrap();
        assert_eq!(params.get_str("userId"), Some("7"));
        assert_eq!(params.get_str("postId"), Some("99"));
        assert_eq!(pattern.keys().collect::<Vec<_>>(), vec!["userId", "postId"]);
    }

    #[test]
    fn test_optional_param() {
        let pattern = PathPattern::new("/users/:id?").unwrap();
        let with = pattern.matches("/users/5", &opts()).unwrap();
        assert_eq!(with.get_str("id"), Some("5"));

        let without = pattern.matches("/users", &opts()).unwrap();
        assert!(without.is_empty());
    }

    #[test]
    fn test_single_wildcards_are_numbered() {
        let params = match_path("/a/*/b/*", "/a/x/b/y", &opts()).unwrap();
        assert_eq!(params.get_str("splat1"), Some("x"));
        assert_eq!(params.get_str("splat2"), Some("y"));
    }

    #[test]
    fn test_double_wildcard_binds_segments() {
        let params = match_path("/files/**", "/files/a/b/c.txt", &opts()).unwrap();
        assert_eq!(
            params.get("splat"),
            Some(&ParamValue::Multi(vec!["a".into(), "b".into(), "c.txt".into()]))
        );
        assert!(match_path("/files/**", "/files", &opts()).is_none());
    }

    #[test]
    fn test_root_star_special_case() {
        let root = match_path("/*", "/", &opts()).unwrap();
        assert_eq!(root.get_str("splat1"), Some(""));

        let deep = match_path("/*", "/a/b", &opts()).unwrap();
        assert_eq!(deep.get_str("splat1"), Some("a/b"));
    }

    #[test]
    fn test_root_prefix_special_case() {
        let prefix = opts().prefix();
        assert!(match_path("/", "/anything/here", &prefix).unwrap().is_empty());
        assert!(match_path("/", "/anything", &opts()).is_none());
    }

    #[test]
    fn test_empty_pattern_and_path() {
        assert!(match_path("", "", &opts()).is_none());
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(match_path("/About", "/about", &opts()).is_some());
        let sensitive = MatchOptions {
            case_sensitive: true,
            ..opts()
        };
        assert!(match_path("/About", "/about", &sensitive).is_none());
    }

    #[test]
    fn test_trailing_slash_strictness() {
        assert!(match_path("/about", "/about/", &opts()).is_some());
        let strict = MatchOptions {
            strict: true,
            ..opts()
        };
        assert!(match_path("/about", "/about/", &strict).is_none());
    }

    #[test]
    fn test_prefix_matching_respects_segment_boundary() {
        let prefix = opts().prefix();
        assert!(match_path("/dashboard", "/dashboard/settings", &prefix).is_some());
        assert!(match_path("/dashboard", "/dashboards", &prefix).is_none());
        assert!(match_path("/dashboard", "/dashboard/settings", &opts()).is_none());
    }

    #[test]
    fn test_match_from_anywhere() {
        let anywhere = MatchOptions {
            match_from_start: false,
            ..opts()
        };
        let params = match_path("/users/:id", "/app/v1/users/3", &anywhere).unwrap();
        assert_eq!(params.get_str("id"), Some("3"));
        assert!(match_path("/users/:id", "/app/v1/users/3", &opts()).is_none());
    }

    #[test]
    fn test_decoding() {
        let params = match_path("/tags/:tag", "/tags/rust%20lang", &opts()).unwrap();
        assert_eq!(params.get_str("tag"), Some("rust lang"));

        let raw = MatchOptions {
            decode_params: false,
            ..opts()
        };
        let params = match_path("/tags/:tag", "/tags/rust%20lang", &raw).unwrap();
        assert_eq!(params.get_str("tag"), Some("rust%20lang"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(match_path("/v1.0/items", "/v1.0/items", &opts()).is_some());
        assert!(match_path("/v1.0/items", "/v1x0/items", &opts()).is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::new("/users/:").is_err());
        assert!(PathPattern::new("/users{/:id").is_err());
        assert!(PathPattern::new("/users}").is_err());
    }

    #[test]
    fn test_fill() {
        let pattern = PathPattern::new("/users/:id/:tab?").unwrap();
        let params: RouteParams = [("id", "a/b")].into_iter().collect();
        assert_eq!(pattern.fill(&params).unwrap(), "/users/a%2Fb");

        let params: RouteParams = [("id", "1"), ("tab", "info")].into_iter().collect();
        assert_eq!(pattern.fill(&params).unwrap(), "/users/1/info");

        let missing = pattern.fill(&RouteParams::new()).unwrap_err();
        assert!(matches!(missing, RouterError::MissingParam { ref name, .. } if name == "id"));
    }

    #[test]
    fn test_merged_overrides() {
        let merged = opts().merged(&MatchOverrides::new().strict(true).delimiter('.'));
        assert!(merged.strict);
        assert_eq!(merged.delimiter, '.');
        assert!(!merged.case_sensitive);
    }
}
