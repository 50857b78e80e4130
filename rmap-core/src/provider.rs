//! Mounted storage providers and the registry that snapshots them into a
//! [`PathTree`].

use crate::resource::Resource;
use crate::tree::PathTree;
use crate::Result;
use std::sync::Arc;

/// How a provider sits relative to whatever else is mounted above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Shadows anything mounted above it within its root.
    Overlay,
    /// Falls through to the parent provider when it has no opinion about a
    /// path (used by `create`/`delete` provider selection).
    Passthrough,
}

/// Capabilities a mounted provider advertises. `ResourceResolverControl`
/// consults these before routing an operation to a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderFlags {
    pub modifiable: bool,
    pub adaptable: bool,
    pub refreshable: bool,
    pub attributable: bool,
    pub queryable: bool,
}

/// Immutable descriptor of a mounted provider. Two handles may share a
/// `root`; ties are broken by `ranking` (higher wins) then registration
/// order when the snapshot tree is built.
#[derive(Clone)]
pub struct ProviderHandle {
    pub id: u64,
    pub root: String,
    pub mode: ProviderMode,
    pub auth_type: String,
    pub flags: ProviderFlags,
    pub ranking: i64,
    pub backend: Arc<dyn StorageProvider>,
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("ranking", &self.ranking)
            .finish()
    }
}

/// Per-provider contract. Implementations are the external storage
/// adapters; the core only depends on this trait.
pub trait StorageProvider: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Resource>>;
    fn list_children(&self, path: &str) -> Result<Vec<Resource>>;

    fn create(&self, _path: &str, _props: serde_json::Value) -> Result<Resource> {
        Err(crate::MapError::Unsupported("create".into()))
    }
    fn delete(&self, _path: &str) -> Result<()> {
        Err(crate::MapError::Unsupported("delete".into()))
    }
    fn order_before(&self, _parent: &str, _name: &str, _sibling: Option<&str>) -> Result<()> {
        Err(crate::MapError::Unsupported("order_before".into()))
    }
    fn commit(&self) -> Result<()> {
        Ok(())
    }
    fn revert(&self) {}
    fn has_changes(&self) -> bool {
        false
    }
    fn get_attribute(&self, _name: &str) -> Option<String> {
        None
    }
    fn attribute_names(&self) -> Vec<String> {
        Vec::new()
    }
    fn supported_languages(&self) -> Vec<String> {
        Vec::new()
    }
    fn find_resources(&self, _query: &str, _language: &str) -> Result<Vec<Resource>> {
        Err(crate::MapError::QueryUnsupported(_language.to_string()))
    }
}

/// Immutable, point-in-time view of the mounted providers, rebuilt whenever
/// the registry changes. Readers hold an `Arc` to one snapshot for the
/// lifetime of an operation rather than re-consulting the live registry.
#[derive(Clone)]
pub struct ProviderStorage {
    pub tree: Arc<PathTree<ProviderHandle>>,
    pub handles: Arc<Vec<ProviderHandle>>,
}

/// The set of registered storage providers. Produces `ProviderStorage`
/// snapshots consumed by `ResourceResolverControl`.
pub struct ProviderRegistry {
    handles: Vec<ProviderHandle>,
    next_id: u64,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            next_id: 1,
        }
    }

    /// Mount a provider, returning the id assigned to its handle.
    pub fn register(
        &mut self,
        root: impl Into<String>,
        mode: ProviderMode,
        flags: ProviderFlags,
        ranking: i64,
        backend: Arc<dyn StorageProvider>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handles.push(ProviderHandle {
            id,
            root: root.into(),
            mode,
            auth_type: "anonymous".to_string(),
            flags,
            ranking,
            backend,
        });
        id
    }

    pub fn unregister(&mut self, id: u64) {
        self.handles.retain(|h| h.id != id);
    }

    /// Build an immutable snapshot: one `PathTree` node per distinct root,
    /// with ties at the same root collapsed to the highest-ranking handle
    /// (stable on registration order).
    pub fn snapshot(&self) -> ProviderStorage {
        let mut by_root: Vec<&ProviderHandle> = self.handles.iter().collect();
        by_root.sort_by(|a, b| a.root.cmp(&b.root).then(b.ranking.cmp(&a.ranking)));

        let mut tree: PathTree<ProviderHandle> = PathTree::new();
        let mut seen_roots: Vec<&str> = Vec::new();
        for handle in &by_root {
            if seen_roots.contains(&handle.root.as_str()) {
                continue;
            }
            seen_roots.push(&handle.root);
            tree.insert(&handle.root, (*handle).clone());
        }

        ProviderStorage {
            tree: Arc::new(tree),
            handles: Arc::new(self.handles.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    struct NullProvider;
    impl StorageProvider for NullProvider {
        fn get(&self, _path: &str) -> Result<Option<Resource>> {
            Ok(None)
        }
        fn list_children(&self, _path: &str) -> Result<Vec<Resource>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn higher_ranking_wins_at_same_root() {
        let mut reg = ProviderRegistry::new();
        reg.register(
            "/content",
            ProviderMode::Overlay,
            ProviderFlags::default(),
            0,
            Arc::new(NullProvider),
        );
        let high = reg.register(
            "/content",
            ProviderMode::Overlay,
            ProviderFlags::default(),
            100,
            Arc::new(NullProvider),
        );
        let snap = reg.snapshot();
        let handle = snap.tree.value_at("/content").unwrap();
        assert_eq!(handle.id, high);
    }

    #[test]
    fn best_matching_value_picks_deepest_mount() {
        let mut reg = ProviderRegistry::new();
        reg.register(
            "/",
            ProviderMode::Overlay,
            ProviderFlags::default(),
            0,
            Arc::new(NullProvider),
        );
        let deep = reg.register(
            "/content/site",
            ProviderMode::Overlay,
            ProviderFlags::default(),
            0,
            Arc::new(NullProvider),
        );
        let snap = reg.snapshot();
        let handle = snap.tree.best_matching_value("/content/site/page").unwrap();
        assert_eq!(handle.id, deep);
    }
}
