//! Copy-on-write radix tree for parameterized route matching.
//!
//! The tree is a compressed trie: static edges carry multi-byte prefixes,
//! and a node holds at most one parameter child (`:name`, captures one
//! segment) and one wildcard child (`*name`, captures the remainder).
//!
//! Mutation is path-copying: [`Tree::insert_with_copy`] allocates fresh
//! nodes only along the insertion path and shares every untouched subtree
//! with the previous version through `Arc`. That makes publishing a new
//! tree orders of magnitude cheaper than a deep clone and is what lets the
//! router swap whole routing tables under a single atomic pointer while
//! old snapshots stay valid for in-flight requests.
//!
//! Matching priority: static children first (greedy on prefix, unambiguous
//! because siblings have distinct first bytes), then the parameter child,
//! then the wildcard child.

use std::collections::HashMap;
use std::sync::Arc;

use super::route::Route;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NodeKind {
    Static,
    Param,
    Wildcard,
}

struct Node {
    kind: NodeKind,
    /// First byte of `prefix`, for cheap child selection (0 for captures).
    label: u8,
    /// Static byte prefix; empty on param/wildcard nodes.
    prefix: String,
    /// Capture name on param/wildcard nodes.
    param_key: String,
    /// Terminal route, if a pattern ends at this node. A terminal node may
    /// still have children.
    route: Option<Arc<Route>>,
    /// Terminal for a pattern ending in a trailing slash, which stays
    /// distinct from the slash-less pattern.
    slash_route: Option<Arc<Route>>,
    /// Static children, distinct first bytes.
    children: Vec<Arc<Node>>,
    param_child: Option<Arc<Node>>,
    wildcard_child: Option<Arc<Node>>,
}

impl Node {
    fn new_static(prefix: String) -> Self {
        let label = prefix.as_bytes().first().copied().unwrap_or(0);
        Self {
            kind: NodeKind::Static,
            label,
            prefix,
            param_key: String::new(),
            route: None,
            slash_route: None,
            children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    fn new_param(param_key: String) -> Self {
        Self {
            kind: NodeKind::Param,
            label: 0,
            prefix: String::new(),
            param_key,
            route: None,
            slash_route: None,
            children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    fn new_wildcard(param_key: String) -> Self {
        Self {
            kind: NodeKind::Wildcard,
            label: 0,
            prefix: String::new(),
            param_key,
            route: None,
            slash_route: None,
            children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Shallow copy: own fields duplicated, every child shared by `Arc`.
    /// The base operation of path copying.
    fn copy_shell(&self) -> Self {
        Self {
            kind: self.kind,
            label: self.label,
            prefix: self.prefix.clone(),
            param_key: self.param_key.clone(),
            route: self.route.clone(),
            slash_route: self.slash_route.clone(),
            children: self.children.clone(),
            param_child: self.param_child.clone(),
            wildcard_child: self.wildcard_child.clone(),
        }
    }
}

/// Split off the next segment; the remainder keeps its leading slash.
fn split_segment(path: &str) -> (&str, &str) {
    match path.find('/') {
        Some(i) => (&path[..i], &path[i..]),
        None => (path, ""),
    }
}

fn longest_common_prefix(a: &str, b: &str) -> usize {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count()
}

fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Radix tree for one HTTP method.
///
/// Cloning a `Tree` shares the root; the clone is a snapshot, not a copy.
#[derive(Clone)]
pub(crate) struct Tree {
    root: Arc<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::new_static(String::new())),
        }
    }

    /// In-place insert for trees a writer exclusively owns.
    pub fn insert(&mut self, path: &str, route: Arc<Route>) {
        *self = self.insert_with_copy(path, route);
    }

    /// Path-copying insert: returns a new tree whose nodes along the
    /// insertion path are fresh and whose every other node is shared with
    /// `self`. `self` is left untouched and remains fully searchable.
    pub fn insert_with_copy(&self, path: &str, route: Arc<Route>) -> Tree {
        let path = normalize(path);
        if path == "/" {
            let mut root = self.root.copy_shell();
            root.route = Some(route);
            return Tree {
                root: Arc::new(root),
            };
        }
        Tree {
            root: Arc::new(Self::insert_node(&self.root, &path, route)),
        }
    }

    fn insert_node(n: &Node, path: &str, route: Arc<Route>) -> Node {
        let mut copy = n.copy_shell();
        // A bare "/" here means the pattern ends in a trailing slash (the
        // root pattern is handled before recursion starts). Trailing-slash
        // patterns bind their own terminal.
        if path == "/" {
            copy.slash_route = Some(route);
            return copy;
        }

        let path = path.strip_prefix('/').unwrap_or(path);
        let (segment, remaining) = split_segment(path);

        if let Some(param_key) = segment.strip_prefix(':') {
            copy.param_child = Some(Arc::new(match &n.param_child {
                None => {
                    let child = Node::new_param(param_key.to_string());
                    if remaining.is_empty() {
                        let mut child = child;
                        child.route = Some(route);
                        child
                    } else {
                        Self::insert_node(&child, remaining, route)
                    }
                }
                // An existing capture position keeps its first-registered
                // name; only the terminal binding below it changes.
                Some(existing) => {
                    if remaining.is_empty() {
                        let mut child = existing.copy_shell();
                        child.route = Some(route);
                        child
                    } else {
                        Self::insert_node(existing, remaining, route)
                    }
                }
            }));
            return copy;
        }

        if let Some(param_key) = segment.strip_prefix('*') {
            // Registration validated the wildcard as the final segment.
            let mut child = match &n.wildcard_child {
                Some(existing) => existing.copy_shell(),
                None => Node::new_wildcard(param_key.to_string()),
            };
            child.route = Some(route);
            copy.wildcard_child = Some(Arc::new(child));
            return copy;
        }

        let matched = n
            .children
            .iter()
            .enumerate()
            .find_map(|(i, child)| {
                let common = longest_common_prefix(segment, &child.prefix);
                (common > 0).then_some((i, common))
            });

        match matched {
            None => {
                // No shared prefix anywhere: append a fresh branch.
                let child = Node::new_static(segment.to_string());
                let child = if remaining.is_empty() {
                    let mut child = child;
                    child.route = Some(route);
                    child
                } else {
                    Self::insert_node(&child, remaining, route)
                };
                copy.children.push(Arc::new(child));
            }
            Some((idx, common)) => {
                let child = &n.children[idx];
                if common == child.prefix.len() {
                    if common == segment.len() {
                        // Segment ends exactly at this child.
                        let new_child = if remaining.is_empty() {
                            let mut c = child.copy_shell();
                            c.route = Some(route);
                            c
                        } else {
                            Self::insert_node(child, remaining, route)
                        };
                        copy.children[idx] = Arc::new(new_child);
                    } else {
                        // Segment extends beyond the child's prefix.
                        let rest = format!("/{}{}", &segment[common..], remaining);
                        copy.children[idx] = Arc::new(Self::insert_node(child, &rest, route));
                    }
                } else {
                    // Shared prefix is strictly shorter than both: split.
                    // The intermediate node takes the shared prefix, the old
                    // child is demoted under its leftover suffix (its own
                    // subtree shared untouched), and the new branch joins as
                    // a sibling.
                    let mut split = Node::new_static(child.prefix[..common].to_string());
                    let mut demoted = child.copy_shell();
                    demoted.prefix = child.prefix[common..].to_string();
                    demoted.label = demoted.prefix.as_bytes()[0];
                    split.children.push(Arc::new(demoted));

                    let split = if common == segment.len() {
                        if remaining.is_empty() {
                            let mut split = split;
                            split.route = Some(route);
                            split
                        } else {
                            Self::insert_node(&split, remaining, route)
                        }
                    } else {
                        let rest = format!("/{}{}", &segment[common..], remaining);
                        Self::insert_node(&split, &rest, route)
                    };
                    copy.children[idx] = Arc::new(split);
                }
            }
        }
        copy
    }

    /// Match a request path. On a hit the second element holds the captured
    /// parameters — `None` when the matched pattern captures nothing, so
    /// static-shaped hits never allocate the map.
    pub fn search(&self, path: &str) -> Option<(Arc<Route>, Option<HashMap<String, String>>)> {
        let path = if path.is_empty() { "/" } else { path };
        if path == "/" {
            return self.root.route.clone().map(|r| (r, None));
        }
        let mut params = None;
        let route = Self::search_node(&self.root, path, &mut params)?;
        Some((route, params))
    }

    fn search_node(
        n: &Node,
        path: &str,
        params: &mut Option<HashMap<String, String>>,
    ) -> Option<Arc<Route>> {
        // An unconsumed "/" is a trailing slash, which only a
        // trailing-slash pattern matches.
        if path == "/" {
            return n.slash_route.clone();
        }

        let path = path.strip_prefix('/').unwrap_or(path);
        let (segment, remaining) = split_segment(path);

        // Static children first. Greedy: with distinct first bytes at most
        // one child can match, so there is nothing to backtrack into.
        for child in &n.children {
            if segment.as_bytes().first() == Some(&child.label)
                && segment.starts_with(child.prefix.as_str())
            {
                if segment.len() == child.prefix.len() {
                    if remaining.is_empty() {
                        return child.route.clone();
                    }
                    return Self::search_node(child, remaining, params);
                }
                let rest = format!("/{}{}", &segment[child.prefix.len()..], remaining);
                return Self::search_node(child, &rest, params);
            }
        }

        if let Some(pc) = &n.param_child {
            params
                .get_or_insert_with(|| HashMap::with_capacity(8))
                .insert(pc.param_key.clone(), segment.to_string());
            let result = if remaining.is_empty() {
                pc.route.clone()
            } else {
                Self::search_node(pc, remaining, params)
            };
            if result.is_some() {
                return result;
            }
            // Undo the capture before falling through to the wildcard.
            if let Some(map) = params.as_mut() {
                map.remove(&pc.param_key);
            }
        }

        if let Some(wc) = &n.wildcard_child {
            params
                .get_or_insert_with(|| HashMap::with_capacity(8))
                .insert(wc.param_key.clone(), path.to_string());
            return wc.route.clone();
        }

        None
    }

    /// Walk a registration pattern literally (`:x` descends the param
    /// child, `*x` the wildcard child). Used to find the previous binding
    /// when a pattern is re-registered.
    pub fn find_pattern(&self, pattern: &str) -> Option<Arc<Route>> {
        let pattern = if pattern.is_empty() { "/" } else { pattern };
        if pattern == "/" {
            return self.root.route.clone();
        }
        Self::find_pattern_node(&self.root, pattern)
    }

    fn find_pattern_node(n: &Node, path: &str) -> Option<Arc<Route>> {
        if path == "/" {
            return n.slash_route.clone();
        }
        let path = path.strip_prefix('/').unwrap_or(path);
        let (segment, remaining) = split_segment(path);

        if segment.starts_with(':') {
            let pc = n.param_child.as_ref()?;
            if remaining.is_empty() {
                return pc.route.clone();
            }
            return Self::find_pattern_node(pc, remaining);
        }
        if segment.starts_with('*') {
            return n.wildcard_child.as_ref().and_then(|w| w.route.clone());
        }
        for child in &n.children {
            if segment.starts_with(child.prefix.as_str()) {
                if segment.len() == child.prefix.len() {
                    if remaining.is_empty() {
                        return child.route.clone();
                    }
                    return Self::find_pattern_node(child, remaining);
                }
                let rest = format!("/{}{}", &segment[child.prefix.len()..], remaining);
                return Self::find_pattern_node(child, &rest);
            }
        }
        None
    }

    /// All routes reachable in this tree, for chain rebuilds and read-only
    /// documentation traversal.
    pub fn collect_routes(&self) -> Vec<Arc<Route>> {
        let mut routes = Vec::new();
        Self::collect_node(&self.root, &mut routes);
        routes
    }

    fn collect_node(n: &Node, out: &mut Vec<Arc<Route>>) {
        if let Some(route) = &n.route {
            out.push(route.clone());
        }
        if let Some(route) = &n.slash_route {
            out.push(route.clone());
        }
        for child in &n.children {
            Self::collect_node(child, out);
        }
        if let Some(pc) = &n.param_child {
            Self::collect_node(pc, out);
        }
        if let Some(wc) = &n.wildcard_child {
            Self::collect_node(wc, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler, HandlerResult};
    use http::Method;
    use serde_json::Value;

    fn route(pattern: &str) -> Arc<Route> {
        Arc::new(Route::new(
            Method::GET,
            pattern.to_string(),
            handler(|_| HandlerResult::ok(Value::Null, 200)),
            Vec::new(),
        ))
    }

    fn found(tree: &Tree, path: &str) -> Option<String> {
        tree.search(path).map(|(r, _)| r.pattern().to_string())
    }

    #[test]
    fn test_static_routes() {
        let mut tree = Tree::new();
        tree.insert("/users", route("/users"));
        tree.insert("/products", route("/products"));
        tree.insert("/api/v1/health", route("/api/v1/health"));

        assert_eq!(found(&tree, "/users").as_deref(), Some("/users"));
        assert_eq!(found(&tree, "/products").as_deref(), Some("/products"));
        assert_eq!(
            found(&tree, "/api/v1/health").as_deref(),
            Some("/api/v1/health")
        );
        assert_eq!(found(&tree, "/notfound"), None);
    }

    #[test]
    fn test_param_routes_capture_segments() {
        let mut tree = Tree::new();
        tree.insert("/users/:id", route("/users/:id"));
        tree.insert("/users/:id/posts", route("/users/:id/posts"));
        tree.insert("/users/:id/posts/:post_id", route("/users/:id/posts/:post_id"));

        let (r, params) = tree.search("/users/789/posts/999").unwrap();
        assert_eq!(r.pattern(), "/users/:id/posts/:post_id");
        let params = params.unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("789"));
        assert_eq!(params.get("post_id").map(String::as_str), Some("999"));

        let (_, params) = tree.search("/users/456/posts").unwrap();
        assert_eq!(params.unwrap().get("id").map(String::as_str), Some("456"));
    }

    #[test]
    fn test_static_beats_param() {
        let mut tree = Tree::new();
        tree.insert("/users/:id", route("/users/:id"));
        tree.insert("/users/new", route("/users/new"));

        assert_eq!(found(&tree, "/users/new").as_deref(), Some("/users/new"));
        assert_eq!(found(&tree, "/users/123").as_deref(), Some("/users/:id"));
    }

    #[test]
    fn test_static_match_captures_nothing() {
        let mut tree = Tree::new();
        tree.insert("/health", route("/health"));
        let (_, params) = tree.search("/health").unwrap();
        assert!(params.is_none());
    }

    #[test]
    fn test_root_path() {
        let mut tree = Tree::new();
        tree.insert("/", route("/"));
        assert_eq!(found(&tree, "/").as_deref(), Some("/"));
        // Empty path normalizes to "/".
        assert_eq!(found(&tree, "").as_deref(), Some("/"));
    }

    #[test]
    fn test_trailing_slash_is_distinct() {
        let mut tree = Tree::new();
        tree.insert("/users", route("/users"));
        assert_eq!(found(&tree, "/users").as_deref(), Some("/users"));
        assert_eq!(found(&tree, "/users/"), None);

        // Registering the slash variant binds its own terminal.
        tree.insert("/users/", route("/users/"));
        assert_eq!(found(&tree, "/users/").as_deref(), Some("/users/"));
        assert_eq!(found(&tree, "/users").as_deref(), Some("/users"));
    }

    #[test]
    fn test_common_prefix_split() {
        let mut tree = Tree::new();
        tree.insert("/user", route("/user"));
        tree.insert("/users", route("/users"));
        tree.insert("/users/admin", route("/users/admin"));

        assert_eq!(found(&tree, "/user").as_deref(), Some("/user"));
        assert_eq!(found(&tree, "/users").as_deref(), Some("/users"));
        assert_eq!(found(&tree, "/users/admin").as_deref(), Some("/users/admin"));
        assert_eq!(found(&tree, "/use"), None);
    }

    #[test]
    fn test_split_preserves_sibling_branches() {
        let mut tree = Tree::new();
        tree.insert("/team", route("/team"));
        tree.insert("/testing", route("/testing"));
        tree.insert("/tea", route("/tea"));

        assert_eq!(found(&tree, "/team").as_deref(), Some("/team"));
        assert_eq!(found(&tree, "/testing").as_deref(), Some("/testing"));
        assert_eq!(found(&tree, "/tea").as_deref(), Some("/tea"));
    }

    #[test]
    fn test_insert_with_copy_leaves_old_tree_untouched() {
        let mut tree = Tree::new();
        tree.insert("/a", route("/a"));
        tree.insert("/b/:id", route("/b/:id"));

        let new_tree = tree.insert_with_copy("/c", route("/c"));

        assert_eq!(found(&tree, "/c"), None);
        assert_eq!(found(&new_tree, "/c").as_deref(), Some("/c"));
        // Everything old is visible in both.
        assert_eq!(found(&tree, "/a").as_deref(), Some("/a"));
        assert_eq!(found(&new_tree, "/a").as_deref(), Some("/a"));
        assert_eq!(found(&new_tree, "/b/7").as_deref(), Some("/b/:id"));
    }

    #[test]
    fn test_insert_with_copy_shares_untouched_subtrees() {
        let mut tree = Tree::new();
        tree.insert("/alpha/one", route("/alpha/one"));
        tree.insert("/beta/two", route("/beta/two"));

        let new_tree = tree.insert_with_copy("/alpha/three", route("/alpha/three"));

        // The /beta branch was not on the insertion path, so both roots
        // point at the same node.
        let old_beta = tree
            .root
            .children
            .iter()
            .find(|c| c.prefix == "beta")
            .unwrap();
        let new_beta = new_tree
            .root
            .children
            .iter()
            .find(|c| c.prefix == "beta")
            .unwrap();
        assert!(Arc::ptr_eq(old_beta, new_beta));

        // The /alpha branch was copied.
        let old_alpha = tree
            .root
            .children
            .iter()
            .find(|c| c.prefix == "alpha")
            .unwrap();
        let new_alpha = new_tree
            .root
            .children
            .iter()
            .find(|c| c.prefix == "alpha")
            .unwrap();
        assert!(!Arc::ptr_eq(old_alpha, new_alpha));
    }

    #[test]
    fn test_wildcard_captures_remainder() {
        let mut tree = Tree::new();
        tree.insert("/static/*filepath", route("/static/*filepath"));

        let (r, params) = tree.search("/static/css/site/main.css").unwrap();
        assert_eq!(r.pattern(), "/static/*filepath");
        assert_eq!(
            params.unwrap().get("filepath").map(String::as_str),
            Some("css/site/main.css")
        );
    }

    #[test]
    fn test_param_wins_over_wildcard() {
        let mut tree = Tree::new();
        tree.insert("/files/*rest", route("/files/*rest"));
        tree.insert("/files/:name", route("/files/:name"));

        let (r, params) = tree.search("/files/report").unwrap();
        assert_eq!(r.pattern(), "/files/:name");
        let params = params.unwrap();
        assert_eq!(params.get("name").map(String::as_str), Some("report"));
        assert!(params.get("rest").is_none());

        // A deeper path falls through the one-segment param to the wildcard
        // without carrying a phantom "name" capture.
        let (r, params) = tree.search("/files/a/b").unwrap();
        assert_eq!(r.pattern(), "/files/*rest");
        let params = params.unwrap();
        assert_eq!(params.get("rest").map(String::as_str), Some("a/b"));
        assert!(params.get("name").is_none());
    }

    #[test]
    fn test_param_position_keeps_first_name() {
        let mut tree = Tree::new();
        tree.insert("/orgs/:org/teams", route("/orgs/:org/teams"));
        tree.insert("/orgs/:id/repos", route("/orgs/:id/repos"));

        let (_, params) = tree.search("/orgs/acme/repos").unwrap();
        // The capture position was created by the first pattern.
        assert_eq!(params.unwrap().get("org").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_find_pattern_walks_literally() {
        let mut tree = Tree::new();
        tree.insert("/users/:id", route("/users/:id"));
        tree.insert("/users/new", route("/users/new"));

        assert_eq!(
            tree.find_pattern("/users/:id").unwrap().pattern(),
            "/users/:id"
        );
        assert_eq!(
            tree.find_pattern("/users/new").unwrap().pattern(),
            "/users/new"
        );
        assert!(tree.find_pattern("/users/:id/posts").is_none());
    }

    #[test]
    fn test_collect_routes_sees_every_terminal() {
        let mut tree = Tree::new();
        let patterns = [
            "/",
            "/users",
            "/users/:id",
            "/users/:id/posts",
            "/static/*rest",
        ];
        for p in patterns {
            tree.insert(p, route(p));
        }
        let mut collected: Vec<String> = tree
            .collect_routes()
            .iter()
            .map(|r| r.pattern().to_string())
            .collect();
        collected.sort();
        let mut expected: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        expected.sort();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_insert_preserves_random_route_sets() {
        // Deterministic xorshift so the case is reproducible.
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        // Two patterns that differ only in a capture name occupy the same
        // tree position, so dedupe by shape (captures folded to ":").
        let shape = |pattern: &str| -> String {
            pattern
                .split('/')
                .map(|s| if s.starts_with(':') { ":" } else { s })
                .collect::<Vec<_>>()
                .join("/")
        };

        let segments = ["api", "v1", "users", "posts", "items", "x", "deep"];
        let mut seen = std::collections::HashSet::new();
        let mut patterns = Vec::new();
        for i in 0..120 {
            let depth = (next() % 4 + 1) as usize;
            let mut pattern = String::new();
            for d in 0..depth {
                pattern.push('/');
                if next() % 3 == 0 {
                    pattern.push_str(&format!(":p{i}_{d}"));
                } else {
                    pattern.push_str(segments[(next() % segments.len() as u64) as usize]);
                    pattern.push_str(&(next() % 10).to_string());
                }
            }
            if seen.insert(shape(&pattern)) {
                patterns.push(pattern);
            }
        }

        let mut tree = Tree::new();
        for p in &patterns {
            tree = tree.insert_with_copy(p, route(p));
        }

        // Every insertion survived: walking each pattern literally finds a
        // route bound to exactly that pattern.
        for p in &patterns {
            let found = tree
                .find_pattern(p)
                .unwrap_or_else(|| panic!("pattern {p} lost"));
            assert_eq!(found.pattern(), p);
        }
    }

    #[test]
    fn test_longest_common_prefix() {
        assert_eq!(longest_common_prefix("abc", "abcd"), 3);
        assert_eq!(longest_common_prefix("abcd", "abc"), 3);
        assert_eq!(longest_common_prefix("test", "test"), 4);
        assert_eq!(longest_common_prefix("test", "different"), 0);
        assert_eq!(longest_common_prefix("", "test"), 0);
    }
}
