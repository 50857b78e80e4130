//! Ordered trie keyed by path segments, used as the provider mount tree.

use crate::path::segments;
use std::collections::BTreeMap;

/// A node of the mount tree. At most one value is attached per node; a node
/// with children but no value is an interior (synthetic) node.
#[derive(Debug, Clone)]
struct Node<V> {
    children: BTreeMap<String, Node<V>>,
    value: Option<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
            value: None,
        }
    }
}

/// Longest-prefix mount tree over `/`-separated paths.
#[derive(Debug, Clone)]
pub struct PathTree<V> {
    root: Node<V>,
}

impl<V> Default for PathTree<V> {
    fn default() -> Self {
        Self {
            root: Node::default(),
        }
    }
}

impl<V: Clone> PathTree<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, value: V) {
        let mut node = &mut self.root;
        for seg in segments(path) {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.value = Some(value);
    }

    pub fn remove(&mut self, path: &str) {
        Self::remove_rec(&mut self.root, &segments(path));
    }

    fn remove_rec(node: &mut Node<V>, segs: &[&str]) -> bool {
        if segs.is_empty() {
            node.value = None;
        } else if let Some(child) = node.children.get_mut(segs[0]) {
            if Self::remove_rec(child, &segs[1..]) {
                node.children.remove(segs[0]);
            }
        }
        node.value.is_none() && node.children.is_empty()
    }

    /// Exact node lookup: `Some(())`-equivalent presence check used by
    /// `is_intermediate_path` — a node exists (has children or a value)
    /// even without a value of its own.
    pub fn has_node(&self, path: &str) -> bool {
        self.find_node(path).is_some()
    }

    fn find_node(&self, path: &str) -> Option<&Node<V>> {
        let mut node = &self.root;
        for seg in segments(path) {
            node = node.children.get(seg)?;
        }
        Some(node)
    }

    /// Value attached exactly at `path`, if any.
    pub fn value_at(&self, path: &str) -> Option<&V> {
        self.find_node(path).and_then(|n| n.value.as_ref())
    }

    /// Longest-prefix match: the value of the deepest ancestor node of
    /// `path` (including `path` itself) that carries a value.
    pub fn best_matching_value(&self, path: &str) -> Option<&V> {
        let mut node = &self.root;
        let mut best = node.value.as_ref();
        for seg in segments(path) {
            match node.children.get(seg) {
                Some(child) => {
                    node = child;
                    if node.value.is_some() {
                        best = node.value.as_ref();
                    }
                }
                None => break,
            }
        }
        best
    }

    /// Names of direct children of the node at `path` that exist in the
    /// tree, in stable sorted order (`list_children` merges these with the
    /// provider's own children).
    pub fn child_names(&self, path: &str) -> Vec<String> {
        match self.find_node(path) {
            Some(node) => node.children.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn child_value(&self, path: &str, name: &str) -> Option<&V> {
        self.find_node(path).and_then(|n| n.children.get(name)?.value.as_ref())
    }

    /// `true` if the child node exists and has descendants of its own
    /// (used to decide whether an unhandled child name should still
    /// surface as a synthetic resource).
    pub fn child_has_descendants(&self, path: &str, name: &str) -> bool {
        self.find_node(path)
            .and_then(|n| n.children.get(name))
            .map(|c| !c.children.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_matching_value_is_longest_prefix() {
        let mut tree = PathTree::new();
        tree.insert("/", "root");
        tree.insert("/content", "content");
        tree.insert("/content/foo", "foo");

        assert_eq!(tree.best_matching_value("/content/foo/bar"), Some(&"foo"));
        assert_eq!(tree.best_matching_value("/content/baz"), Some(&"content"));
        assert_eq!(tree.best_matching_value("/other"), Some(&"root"));
    }

    #[test]
    fn has_node_true_for_interior_without_value() {
        let mut tree: PathTree<&str> = PathTree::new();
        tree.insert("/a/b/c", "leaf");
        assert!(tree.has_node("/a/b"));
        assert!(tree.has_node("/a"));
        assert!(!tree.has_node("/x"));
    }

    #[test]
    fn remove_prunes_empty_interior_nodes() {
        let mut tree = PathTree::new();
        tree.insert("/a/b", "leaf");
        tree.remove("/a/b");
        assert!(!tree.has_node("/a/b"));
        assert!(!tree.has_node("/a"));
    }

    #[test]
    fn remove_keeps_ancestor_with_other_children() {
        let mut tree = PathTree::new();
        tree.insert("/a/b", "leaf1");
        tree.insert("/a/c", "leaf2");
        tree.remove("/a/b");
        assert!(tree.has_node("/a"));
        assert!(tree.has_node("/a/c"));
        assert!(!tree.has_node("/a/b"));
    }
}
