//! Integration tests for pattern matching and nested resolution

mod common;

use common::*;
use waymark::location::{build_url, UrlParts};
use waymark::pattern::match_path;
use waymark::*;

fn tree(routes: Vec<Route<Screen>>) -> RouteTree<Screen> {
    init_logging();
    RouteTree::new(routes).expect("routes should compile")
}

// ============================================================================
// Pattern round-trip
// ============================================================================

#[test]
fn test_filled_pattern_matches_back_to_same_values() {
    let pattern = PathPattern::new("/users/:userId/posts/:postId").unwrap();
    let samples = [
        ("42", "7"),
        ("jane doe", "hello-world"),
        ("café", "100%"),
        ("a+b", "x?y"),
        ("#tag", "名前"),
    ];

    for (user, post) in samples {
        let params: RouteParams = [("userId", user), ("postId", post)].into_iter().collect();
        let path = pattern.fill(&params).unwrap();
        let matched = pattern
            .matches(&path, &MatchOptions::default())
            .unwrap_or_else(|| panic!("'{path}' should match"));

        assert_eq!(matched.get_str("userId"), Some(user), "path {path}");
        assert_eq!(matched.get_str("postId"), Some(post), "path {path}");
    }
}

#[test]
fn test_round_trip_without_decoding_keeps_encoded_values() {
    let options = MatchOptions {
        decode_params: false,
        ..MatchOptions::default()
    };
    let params: RouteParams = [("id", "a b")].into_iter().collect();
    let url = build_url(
        "/items/:id",
        &UrlParts {
            params: Some(&params),
            ..UrlParts::default()
        },
    );

    let matched = match_path("/items/:id", &url, &options).unwrap();
    assert_eq!(matched.get_str("id"), Some("a%20b"));
}

#[test]
fn test_optional_param() {
    let options = MatchOptions::default();
    let with = match_path("/params-opt/:id?", "/params-opt/9", &options).unwrap();
    assert_eq!(with.get_str("id"), Some("9"));

    let without = match_path("/params-opt/:id?", "/params-opt", &options).unwrap();
    assert!(without.get("id").is_none());
}

// ============================================================================
// Nested resolution
// ============================================================================

#[test]
fn test_index_child_wins_over_parent() {
    let tree = tree(dashboard_routes());

    let index = tree.resolve("/dashboard", &MatchOptions::default()).unwrap();
    assert_eq!(index.node.view().ready(), Some(&"DashboardIndex"));
    assert_eq!(index.chain_paths(), vec!["/dashboard", "/dashboard"]);

    let settings = tree
        .resolve("/dashboard/settings", &MatchOptions::default())
        .unwrap();
    assert_eq!(settings.node.view().ready(), Some(&"Settings"));
    assert_eq!(settings.chain.len(), 2);
    assert_eq!(
        settings.parent.as_ref().map(|p| p.path()),
        Some("/dashboard")
    );
}

#[test]
fn test_nested_params_merge() {
    let tree = tree(vec![Route::new("/nested/:parentId", "Parent")
        .child(Route::new("/nested/:parentId/child/:childId", "Child"))]);

    let matched = tree
        .resolve("/nested/1/child/2", &MatchOptions::default())
        .unwrap();

    assert_eq!(matched.chain.len(), 2);
    assert_eq!(matched.params.len(), 2);
    assert_eq!(matched.params.get_str("parentId"), Some("1"));
    assert_eq!(matched.params.get_str("childId"), Some("2"));
}

#[test]
fn test_deep_chain() {
    let tree = tree(vec![Route::new("/nested-multi/:parentId", "Parent").child(
        Route::new("/nested-multi/:parentId/child/:childId", "Child").child(Route::new(
            "/nested-multi/:parentId/child/:childId/posts/:postId",
            "Post",
        )),
    )]);

    let matched = tree
        .resolve("/nested-multi/a/child/b/posts/c", &MatchOptions::default())
        .unwrap();

    assert_eq!(matched.depth(), 3);
    assert_eq!(matched.params.get_str("postId"), Some("c"));
    assert_eq!(matched.params.get_str("parentId"), Some("a"));
}

#[test]
fn test_unmatched_child_path_is_not_found() {
    let tree = tree(dashboard_routes());
    assert!(tree
        .resolve("/dashboard/unknown", &MatchOptions::default())
        .is_none());
}

#[test]
fn test_optional_params_across_levels() {
    let tree = tree(vec![Route::new("/nested-opt/:parentId?", "Parent")
        .child(Route::new("/nested-opt/:parentId?/child/:childId?", "Child"))]);
    let options = MatchOptions::default();

    let bare = tree.resolve("/nested-opt", &options).unwrap();
    assert_eq!(bare.node.view().ready(), Some(&"Parent"));
    assert!(bare.params.is_empty());

    let parent = tree.resolve("/nested-opt/1", &options).unwrap();
    assert_eq!(parent.node.view().ready(), Some(&"Parent"));
    assert_eq!(parent.params.get_str("parentId"), Some("1"));

    // "child" is a literal segment of the child route, not a parent id.
    let child = tree.resolve("/nested-opt/child", &options).unwrap();
    assert_eq!(child.node.view().ready(), Some(&"Child"));
    assert_eq!(child.params.get_str("parentId"), None);
    assert!(child.params.is_empty());

    let full = tree.resolve("/nested-opt/1/child/2", &options).unwrap();
    assert_eq!(full.node.view().ready(), Some(&"Child"));
    assert_eq!(full.params.get_str("parentId"), Some("1"));
    assert_eq!(full.params.get_str("childId"), Some("2"));
}

#[test]
fn test_case_sensitive_override() {
    let tree = tree(vec![
        Route::new("/Strict", "Strict").match_overrides(MatchOverrides::new().case_sensitive(true)),
        Route::new("/loose", "Loose"),
    ]);
    let options = MatchOptions::default();

    assert!(tree.resolve("/strict", &options).is_none());
    assert!(tree.resolve("/Strict", &options).is_some());
    assert!(tree.resolve("/LOOSE", &options).is_some());
}

#[test]
fn test_invalid_pattern_fails_router_build() {
    let result = Router::builder(
        vec![Route::new("/broken/{:id", "Broken")],
        MemoryHistory::new("/"),
    )
    .build();

    assert!(matches!(
        result,
        Err(RouterError::Configuration(ConfigError::InvalidPattern { .. }))
    ));
}
