//! In-memory index of `parent_path -> child_name -> [alias]`, built from a
//! full repository scan and kept current by incremental change events.

use crate::path::{owning_resource, JCR_CONTENT};
use crate::resource::Resource;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_EXAMPLES: usize = 50;

fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty() && alias != "." && alias != ".." && !alias.contains(['/', '#', '?'])
}

#[derive(Default)]
struct Counters {
    invalid: AtomicU64,
    conflicting: AtomicU64,
    invalid_examples: Mutex<Vec<String>>,
    conflicting_examples: Mutex<Vec<String>>,
}

impl Counters {
    fn record_invalid(&self, example: String) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
        let mut examples = self.invalid_examples.lock();
        if examples.len() < MAX_EXAMPLES {
            examples.push(example);
        }
    }

    fn record_conflicting(&self, example: String) {
        self.conflicting.fetch_add(1, Ordering::Relaxed);
        let mut examples = self.conflicting_examples.lock();
        if examples.len() < MAX_EXAMPLES {
            examples.push(example);
        }
    }
}

/// `parent_path -> child_name -> ordered [alias]`, concurrent map of
/// concurrent maps. An alias is never empty or path-like, belongs to at
/// most one sibling under a given parent (later registrations are
/// rejected), and insertion order is preserved per child.
pub struct AliasIndex {
    entries: DashMap<String, DashMap<String, Vec<String>>>,
    /// `"{parent}\0{child_name}" -> { source_path -> aliases }`: a child's
    /// own node and its `jcr:content` child each contribute independently,
    /// so that one being re-registered doesn't clobber the other's aliases.
    sources: DashMap<String, DashMap<String, Vec<String>>>,
    counters: Counters,
}

impl Default for AliasIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sources: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn invalid_alias_count(&self) -> u64 {
        self.counters.invalid.load(Ordering::Relaxed)
    }

    pub fn conflicting_alias_count(&self) -> u64 {
        self.counters.conflicting.load(Ordering::Relaxed)
    }

    /// Full (re)build from a scan of resources carrying `sling:alias`.
    /// Each resource is attributed to its owning parent per the
    /// `jcr:content` rule.
    pub fn initialize<'a>(&self, resources: impl Iterator<Item = &'a Resource>) {
        self.entries.clear();
        self.sources.clear();
        for resource in resources {
            self.add_resource(resource);
        }
    }

    /// Register (or re-register) one resource's aliases. The resource's own
    /// node and its `jcr:content` child are separate sources that both feed
    /// the same owning child's alias list; this records `resource.path`'s
    /// contribution and recomputes the merged list from every source on
    /// file for that child, so the two never clobber each other.
    pub fn add_resource(&self, resource: &Resource) {
        let aliases = resource.string_values("sling:alias");
        let owner = owning_resource(&resource.path);
        let parent = match crate::path::parent(&owner) {
            Some(p) => p,
            None => return, // root has no parent to index under
        };
        let child_name = crate::path::name(&owner).to_string();
        self.record_source(&parent, &child_name, &resource.path, aliases);
    }

    fn record_source(&self, parent: &str, child_name: &str, source_path: &str, aliases: Vec<String>) {
        let source_key = format!("{parent}\u{0}{child_name}");
        let merged = {
            let child_sources = self.sources.entry(source_key).or_default();
            if aliases.is_empty() {
                child_sources.remove(source_path);
            } else {
                child_sources.insert(source_path.to_string(), aliases);
            }
            // the owning node's own path is always shorter than its
            // `jcr:content` child's, so sorting by path length preserves
            // "own node's aliases before its jcr:content child's".
            let mut by_source: Vec<(String, Vec<String>)> =
                child_sources.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
            by_source.sort_by_key(|(path, _)| path.len());
            by_source.into_iter().flat_map(|(_, a)| a).collect()
        };
        self.set_child_aliases(parent, child_name, merged);
    }

    fn set_child_aliases(&self, parent: &str, child_name: &str, aliases: Vec<String>) {
        let children = self.entries.entry(parent.to_string()).or_default();

        let mut accepted = Vec::new();
        for alias in aliases {
            if !is_valid_alias(&alias) {
                self.counters.record_invalid(format!("{parent}/{child_name} -> {alias}"));
                continue;
            }
            let taken_by_other = children
                .iter()
                .any(|entry| entry.key() != child_name && entry.value().contains(&alias));
            if taken_by_other {
                self.counters.record_conflicting(format!("{parent}/{child_name} -> {alias}"));
                continue;
            }
            accepted.push(alias);
        }
        if accepted.is_empty() {
            children.remove(child_name);
        } else {
            children.insert(child_name.to_string(), accepted);
        }
    }

    /// Remove all aliases registered under `child_name` at `parent`,
    /// including every source's contribution to it.
    pub fn remove_child(&self, parent: &str, child_name: &str) {
        if let Some(children) = self.entries.get(parent) {
            children.remove(child_name);
        }
        self.sources.remove(&format!("{parent}\u{0}{child_name}"));
    }

    /// Remove every entry whose resolved key path starts with `prefix`
    /// (used when a subtree is deleted).
    pub fn remove_subtree(&self, prefix: &str) {
        self.entries.retain(|parent, children| {
            if crate::path::is_ancestor_or_self(prefix, parent) {
                children.clear();
                false
            } else {
                children.retain(|child_name, _| {
                    let full = crate::path::join(parent, child_name);
                    !crate::path::is_ancestor_or_self(prefix, &full)
                });
                true
            }
        });
        self.sources.retain(|key, _| {
            let (parent, child_name) = key.split_once('\u{0}').unwrap_or((key.as_str(), ""));
            !crate::path::is_ancestor_or_self(prefix, &crate::path::join(parent, child_name))
        });
    }

    pub fn aliases_for(&self, parent: &str, child_name: &str) -> Vec<String> {
        self.entries
            .get(parent)
            .and_then(|children| children.get(child_name).map(|v| v.clone()))
            .unwrap_or_default()
    }

    /// All `(child_name, aliases)` pairs registered directly under `parent`.
    pub fn children_of(&self, parent: &str) -> Vec<(String, Vec<String>)> {
        self.entries
            .get(parent)
            .map(|children| {
                children
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve an alias segment seen under `parent` back to the real child
    /// name it stands for, if any.
    pub fn resolve(&self, parent: &str, alias: &str) -> Option<String> {
        let children = self.entries.get(parent)?;
        children
            .iter()
            .find(|entry| entry.value().iter().any(|a| a == alias))
            .map(|entry| entry.key().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of children anywhere in the index that carry at least
    /// one registered alias.
    pub fn children_with_aliases_count(&self) -> u64 {
        self.entries.iter().map(|e| e.value().len() as u64).sum()
    }

    /// Used to attribute a `jcr:content` change event to the resource that
    /// owns the alias property it may carry: the path itself, a direct
    /// child (except `jcr:content`), or a
    /// `jcr:content` grandchild are in scope; anything else is ignored.
    pub const JCR_CONTENT_CHILD: &'static str = JCR_CONTENT;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource_with_alias(path: &str, aliases: &[&str]) -> Resource {
        Resource::new(path, "nt:unstructured")
            .with_property("sling:alias", json!(aliases))
    }

    #[test]
    fn valid_alias_is_indexed_and_resolves() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["f", "foo-alias"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["f", "foo-alias"]);
        assert_eq!(index.resolve("/content", "f"), Some("foo".to_string()));
    }

    #[test]
    fn invalid_alias_rejected_and_counted() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["has/slash", "ok"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["ok"]);
        assert_eq!(index.invalid_alias_count(), 1);
    }

    #[test]
    fn conflicting_alias_across_siblings_is_rejected() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["shared"]));
        index.add_resource(&resource_with_alias("/content/bar", &["shared"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["shared"]);
        assert!(index.aliases_for("/content", "bar").is_empty());
        assert_eq!(index.conflicting_alias_count(), 1);
    }

    #[test]
    fn jcr_content_alias_attributed_to_parent() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo/jcr:content", &["f"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["f"]);
    }

    #[test]
    fn remove_subtree_clears_nested_entries() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["f"]));
        index.remove_subtree("/content/foo");
        assert!(index.aliases_for("/content", "foo").is_empty());
    }

    #[test]
    fn own_node_and_jcr_content_aliases_merge_without_clobbering() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["own"]));
        index.add_resource(&resource_with_alias("/content/foo/jcr:content", &["jc"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["own", "jc"]);
        // re-registering just the jcr:content child must not drop the
        // node's own contribution.
        index.add_resource(&resource_with_alias("/content/foo/jcr:content", &["jc2"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["own", "jc2"]);
    }

    #[test]
    fn update_replaces_previous_aliases_for_child() {
        let index = AliasIndex::new();
        index.add_resource(&resource_with_alias("/content/foo", &["old"]));
        index.remove_child("/content", "foo");
        index.add_resource(&resource_with_alias("/content/foo", &["new"]));
        assert_eq!(index.aliases_for("/content", "foo"), vec!["new"]);
    }
}
