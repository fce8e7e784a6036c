//! Nested route resolution.
//!
//! [`RouteTree`] walks the compiled route forest depth-first and returns the
//! first match, preferring descent into children:
//!
//! 1. A node **with children** is first tried as a prefix (`match_to_end`
//!    forced off). On success its children are searched; the first child
//!    match wins. If no child matches, the node itself is retried as an
//!    exact match and, if that succeeds, serves as the leaf.
//! 2. A node **without children** must match exactly.
//! 3. Siblings are tried in declaration order; the first hit wins.
//!
//! This lets a layout `/dashboard` with an index child also at `/dashboard`
//! resolve to the child, while the layout still catches `/dashboard` when
//! no child pattern fits.
//!
//! Parameters bound at every level are merged root to leaf; when two levels
//! bind the same name the deeper value wins.

use crate::error::ConfigError;
use crate::middleware::Middleware;
use crate::params::RouteParams;
use crate::pattern::{MatchOptions, PathPattern};
use crate::route::{Route, RouteNode};
use crate::{trace_log, warn_log};
use std::fmt;
use std::sync::Arc;

/// Nesting depth past which resolution gives up.
const MAX_DEPTH: usize = 32;

// ============================================================================
// RouteMatch
// ============================================================================

/// Result of resolving a path against the route tree.
pub struct RouteMatch<C> {
    /// The matched (leaf) node.
    pub node: Arc<RouteNode<C>>,
    /// Parameters merged across the whole chain.
    pub params: RouteParams,
    /// Root-to-leaf chain; never empty and always ends with `node`.
    pub chain: Vec<Arc<RouteNode<C>>>,
    /// The node directly above `node`, if any.
    pub parent: Option<Arc<RouteNode<C>>>,
}

impl<C> RouteMatch<C> {
    /// Middleware for this match, collected root to leaf.
    pub fn middlewares(&self) -> Vec<Arc<dyn Middleware>> {
        self.chain
            .iter()
            .flat_map(|node| node.middlewares().iter().cloned())
            .collect()
    }

    /// Depth of the chain (1 for a top-level route).
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Path patterns along the chain, for diagnostics.
    pub fn chain_paths(&self) -> Vec<&str> {
        self.chain.iter().map(|node| node.path()).collect()
    }
}

impl<C> Clone for RouteMatch<C> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            params: self.params.clone(),
            chain: self.chain.clone(),
            parent: self.parent.clone(),
        }
    }
}

impl<C> fmt::Debug for RouteMatch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("node", &self.node.path())
            .field("params", &self.params)
            .field("chain", &self.chain_paths())
            .finish()
    }
}

// ============================================================================
// RouteTree
// ============================================================================

/// A compiled, immutable route forest.
pub struct RouteTree<C> {
    roots: Vec<Arc<RouteNode<C>>>,
}

impl<C> RouteTree<C> {
    /// Compile a route table.
    ///
    /// Fails if any pattern in the table is malformed.
    pub fn new(routes: impl IntoIterator<Item = Route<C>>) -> Result<Self, ConfigError> {
        let roots = routes
            .into_iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { roots })
    }

    /// Top-level nodes.
    pub fn roots(&self) -> &[Arc<RouteNode<C>>] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Resolve `path` against the tree.
    ///
    /// Returns `None` when nothing matches; that is a valid "not found"
    /// state, not an error.
    pub fn resolve(&self, path: &str, options: &MatchOptions) -> Option<RouteMatch<C>> {
        trace_log!("resolving '{}'", path);
        let found = match_level(&self.roots, path, options, &[], None, &RouteParams::new(), 0);
        match &found {
            Some(m) => trace_log!("'{}' resolved to chain {:?}", path, m.chain_paths()),
            None => trace_log!("'{}' matched no route", path),
        }
        found
    }
}

impl<C> fmt::Debug for RouteTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTree")
            .field("roots", &self.roots)
            .finish()
    }
}

fn match_level<C>(
    nodes: &[Arc<RouteNode<C>>],
    path: &str,
    global: &MatchOptions,
    chain: &[Arc<RouteNode<C>>],
    parent: Option<&Arc<RouteNode<C>>>,
    inherited: &RouteParams,
    depth: usize,
) -> Option<RouteMatch<C>> {
    if depth > MAX_DEPTH {
        warn_log!("route nesting deeper than {} while resolving '{}'", MAX_DEPTH, path);
        return None;
    }

    for node in nodes {
        let options = global.merged(&node.config.match_overrides);

        if node.has_children() {
            let Some(prefix_params) = node.pattern().matches(path, &options.prefix()) else {
                continue;
            };

            let mut next_chain = chain.to_vec();
            next_chain.push(Arc::clone(node));
            let accumulated = RouteParams::merge(inherited, &prefix_params);

            if let Some(found) = match_level(
                &node.children,
                path,
                global,
                &next_chain,
                Some(node),
                &accumulated,
                depth + 1,
            ) {
                return Some(found);
            }

            if let Some(exact) = node.pattern().matches(path, &options) {
                return Some(RouteMatch {
                    node: Arc::clone(node),
                    params: bind(inherited, node.pattern(), &exact),
                    chain: next_chain,
                    parent: parent.cloned(),
                });
            }
        } else if let Some(exact) = node.pattern().matches(path, &options) {
            let mut next_chain = chain.to_vec();
            next_chain.push(Arc::clone(node));
            return Some(RouteMatch {
                node: Arc::clone(node),
                params: bind(inherited, node.pattern(), &exact),
                chain: next_chain,
                parent: parent.cloned(),
            });
        }
    }

    None
}

/// Params of a matched node laid over those inherited from its ancestors.
///
/// A key the node declares but left unbound (an optional param that was
/// skipped) drops the inherited value, which came from a looser prefix match.
fn bind(inherited: &RouteParams, pattern: &PathPattern, own: &RouteParams) -> RouteParams {
    let mut params = inherited.clone();
    for key in pattern.keys() {
        if !own.contains(key) {
            params.remove(key);
        }
    }
    params.extend(own);
    params
}

// ============================================================================
// Tests
// ============================================================================
