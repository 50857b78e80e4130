//! Per-session façade that routes resource operations to the correct
//! mounted provider via the mount tree, synthesizing intermediate
//! resources where the tree has structure but no provider of its own.

use crate::map_entries::MapEntries;
use crate::provider::{ProviderHandle, ProviderMode, ProviderStorage};
use crate::resource::Resource;
use crate::{MapError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A single session's view of the mounted providers. Not thread-safe by
/// design: one session is used by one thread at a time. `close` is
/// idempotent via a one-shot flag.
pub struct ResourceResolverControl {
    snapshot: ProviderStorage,
    map_entries: Arc<MapEntries>,
    touched: Mutex<HashSet<u64>>,
    closed: AtomicBool,
}

fn swallow_auth<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(MapError::Authentication(_)) => Ok(T::default()),
        other => other,
    }
}

impl ResourceResolverControl {
    pub fn open(snapshot: ProviderStorage, map_entries: Arc<MapEntries>) -> Self {
        map_entries.track_resolver_opened();
        Self {
            snapshot,
            map_entries,
            touched: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(MapError::Disposed)
        } else {
            Ok(())
        }
    }

    fn mark_touched(&self, handle: &ProviderHandle) {
        self.touched.lock().unwrap().insert(handle.id);
    }

    /// `get`: if `path` is not absolute, `None`. Otherwise ask the
    /// best-matching provider; when it returns nothing and `is_resolve` is
    /// false and the path is an interior mount-tree node, synthesize a
    /// resource rather than returning `None`.
    pub fn get(&self, path: &str, is_resolve: bool) -> Result<Option<Resource>> {
        self.require_open()?;
        if !crate::path::is_absolute(path) {
            return Ok(None);
        }
        let handle = self.snapshot.tree.best_matching_value(path);
        let found = match handle {
            Some(h) => swallow_auth(h.backend.get(path))?,
            None => None,
        };
        if found.is_some() {
            return Ok(found);
        }
        if !is_resolve && self.snapshot.tree.has_node(path) {
            return Ok(Some(Resource::synthetic_at(path)));
        }
        Ok(None)
    }

    pub fn get_parent(&self, child: &Resource) -> Result<Option<Resource>> {
        self.require_open()?;
        let parent_path = match crate::path::parent(&child.path) {
            Some(p) => p,
            None => return Ok(None),
        };
        let child_handle = self.snapshot.tree.best_matching_value(&child.path);
        let parent_handle = self.snapshot.tree.best_matching_value(&parent_path);
        let same_provider = matches!((child_handle, parent_handle), (Some(a), Some(b)) if a.id == b.id);
        let handle = if same_provider { child_handle } else { parent_handle };
        let found = match handle {
            Some(h) => swallow_auth(h.backend.get(&parent_path))?,
            None => None,
        };
        if found.is_some() {
            return Ok(found);
        }
        if self.snapshot.tree.has_node(&parent_path) {
            return Ok(Some(Resource::synthetic_at(parent_path)));
        }
        Ok(None)
    }

    /// `list_children`: merges real provider children with the mount
    /// tree's own child names, emitting handle-produced resources first,
    /// then the provider's real children, then synthetic resources for
    /// interior tree nodes with no backing resource. Names are
    /// deduplicated across all three sources.
    pub fn list_children(&self, parent: &Resource) -> Result<Vec<Resource>> {
        self.require_open()?;
        let mut out = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        for name in self.snapshot.tree.child_names(&parent.path) {
            if let Some(handle) = self.snapshot.tree.child_value(&parent.path, &name) {
                let child_path = crate::path::join(&parent.path, &name);
                match swallow_auth(handle.backend.get(&child_path))? {
                    Some(resource) => out.push(resource),
                    None if self.snapshot.tree.child_has_descendants(&parent.path, &name) => {
                        out.push(Resource::synthetic_at(child_path));
                    }
                    None => {}
                }
                visited.insert(name);
            }
        }

        if let Some(handle) = self.snapshot.tree.best_matching_value(&parent.path) {
            for resource in swallow_auth(handle.backend.list_children(&parent.path))? {
                let name = resource.name().to_string();
                if visited.insert(name) {
                    out.push(resource);
                }
            }
        }

        for name in self.snapshot.tree.child_names(&parent.path) {
            if visited.insert(name.clone()) {
                out.push(Resource::synthetic_at(crate::path::join(&parent.path, &name)));
            }
        }

        Ok(out)
    }

    fn modifiable_handle(&self, path: &str) -> Option<&ProviderHandle> {
        let mut current = path.to_string();
        loop {
            let handle = self.snapshot.tree.best_matching_value(&current)?;
            if handle.flags.modifiable {
                return Some(handle);
            }
            if handle.mode != ProviderMode::Passthrough {
                return None;
            }
            let parent = crate::path::parent(&current)?;
            if parent == current {
                return None;
            }
            current = parent;
        }
    }

    pub fn create(&self, path: &str, props: serde_json::Value) -> Result<Resource> {
        self.require_open()?;
        let handle = self
            .modifiable_handle(path)
            .ok_or_else(|| MapError::Unsupported(format!("no modifiable provider for {path}")))?;
        self.mark_touched(handle);
        handle.backend.create(path, props)
    }

    pub fn delete(&self, resource: &Resource) -> Result<()> {
        self.require_open()?;
        let handle = self
            .modifiable_handle(&resource.path)
            .ok_or_else(|| MapError::Unsupported(format!("no modifiable provider for {}", resource.path)))?;
        self.mark_touched(handle);
        handle.backend.delete(&resource.path)
    }

    /// Generic copy: recursively reads the source subtree and recreates it
    /// under `dst`; on failure, deletes everything it created so far.
    pub fn copy(&self, src: &Resource, dst: &str) -> Result<Vec<Resource>> {
        self.require_open()?;
        let mut created = Vec::new();
        match self.copy_recursive(src, dst, &mut created) {
            Ok(()) => Ok(created),
            Err(e) => {
                for resource in created.iter().rev() {
                    let _ = self.delete(resource);
                }
                Err(e)
            }
        }
    }

    fn copy_recursive(&self, src: &Resource, dst: &str, created: &mut Vec<Resource>) -> Result<()> {
        let resource = self.create(dst, serde_json::to_value(&src.properties).unwrap_or_default())?;
        created.push(resource);
        for child in self.list_children(src)? {
            let child_dst = crate::path::join(dst, child.name());
            self.copy_recursive(&child, &child_dst, created)?;
        }
        Ok(())
    }

    pub fn move_resource(&self, src: &Resource, dst: &str) -> Result<Vec<Resource>> {
        self.require_open()?;
        let created = self.copy(src, dst)?;
        self.delete(src)?;
        Ok(created)
    }

    pub fn order_before(&self, parent: &Resource, name: &str, sibling: Option<&str>) -> Result<()> {
        self.require_open()?;
        let handle = self
            .snapshot
            .tree
            .best_matching_value(&parent.path)
            .ok_or_else(|| MapError::IllegalArgument(format!("no provider owns {}", parent.path)))?;
        self.mark_touched(handle);
        handle.backend.order_before(&parent.path, name, sibling)
    }

    pub fn commit(&self) -> Result<()> {
        self.require_open()?;
        for handle in self.touched_handles() {
            handle.backend.commit()?;
        }
        Ok(())
    }

    pub fn revert(&self) -> Result<()> {
        self.require_open()?;
        for handle in self.touched_handles() {
            handle.backend.revert();
        }
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.touched_handles().iter().any(|h| h.backend.has_changes())
    }

    fn touched_handles(&self) -> Vec<&ProviderHandle> {
        let ids = self.touched.lock().unwrap();
        self.snapshot.handles.iter().filter(|h| ids.contains(&h.id)).collect()
    }

    const RESERVED_ATTRIBUTES: [&'static str; 3] =
        ["user.password", "user.jcr.credentials.subservicename", "user.jcr.credentials.bundle"];

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        if Self::RESERVED_ATTRIBUTES.contains(&name) {
            return None;
        }
        self.snapshot
            .handles
            .iter()
            .filter(|h| h.flags.attributable)
            .find_map(|h| h.backend.get_attribute(name))
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshot
            .handles
            .iter()
            .filter(|h| h.flags.attributable)
            .flat_map(|h| h.backend.attribute_names())
            .filter(|n| !Self::RESERVED_ATTRIBUTES.contains(&n.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn find_resources(&self, query: &str, language: &str) -> Result<Vec<Resource>> {
        self.require_open()?;
        let mut any_supported = false;
        let mut out = Vec::new();
        for handle in self.snapshot.handles.iter().filter(|h| h.flags.queryable) {
            if !handle.backend.supported_languages().iter().any(|l| l == language) {
                continue;
            }
            any_supported = true;
            out.extend(swallow_auth(handle.backend.find_resources(query, language))?);
        }
        if !any_supported {
            return Err(MapError::QueryUnsupported(language.to_string()));
        }
        Ok(out)
    }

    pub fn is_intermediate_path(&self, path: &str) -> bool {
        self.snapshot.tree.has_node(path)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.map_entries.track_resolver_closed();
        }
    }
}

impl Drop for ResourceResolverControl {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::{ProviderFlags, ProviderMode, ProviderRegistry, StorageProvider};
    use std::sync::Arc;

    struct MemProvider {
        resources: std::collections::HashMap<String, Resource>,
    }

    impl StorageProvider for MemProvider {
        fn get(&self, path: &str) -> Result<Option<Resource>> {
            Ok(self.resources.get(path).cloned())
        }
        fn list_children(&self, path: &str) -> Result<Vec<Resource>> {
            Ok(self
                .resources
                .values()
                .filter(|r| crate::path::parent(&r.path).as_deref() == Some(path))
                .cloned()
                .collect())
        }
    }

    fn control_with(resources: Vec<Resource>) -> ResourceResolverControl {
        let mut registry = ProviderRegistry::new();
        let map: std::collections::HashMap<_, _> = resources.into_iter().map(|r| (r.path.clone(), r)).collect();
        registry.register(
            "/",
            ProviderMode::Overlay,
            ProviderFlags { modifiable: true, ..ProviderFlags::default() },
            0,
            Arc::new(MemProvider { resources: map }),
        );
        let snapshot = registry.snapshot();
        let entries = MapEntries::new(Config::default());
        ResourceResolverControl::open(snapshot, entries)
    }

    #[test]
    fn get_returns_real_resource() {
        let control = control_with(vec![Resource::new("/content/foo", "nt:unstructured")]);
        let resource = control.get("/content/foo", false).unwrap().unwrap();
        assert_eq!(resource.path, "/content/foo");
        assert!(!resource.synthetic);
    }

    #[test]
    fn get_on_non_absolute_path_is_none() {
        let control = control_with(vec![]);
        assert!(control.get("relative", false).unwrap().is_none());
    }

    #[test]
    fn is_resolve_suppresses_synthetic_resource() {
        // "/content/foo" is an interior mount-tree node only because a
        // second provider is mounted below it; it carries no resource of
        // its own, so a non-resolve `get` should synthesize one.
        let mut registry = ProviderRegistry::new();
        registry.register(
            "/",
            ProviderMode::Overlay,
            ProviderFlags { modifiable: true, ..ProviderFlags::default() },
            0,
            Arc::new(MemProvider { resources: Default::default() }),
        );
        registry.register(
            "/content/foo/deep",
            ProviderMode::Overlay,
            ProviderFlags::default(),
            0,
            Arc::new(MemProvider { resources: Default::default() }),
        );
        let snapshot = registry.snapshot();
        let entries = MapEntries::new(Config::default());
        let control = ResourceResolverControl::open(snapshot, entries);

        assert!(control.get("/content/foo", true).unwrap().is_none());
        assert!(control.get("/content/foo", false).unwrap().unwrap().synthetic);
    }

    #[test]
    fn reserved_attributes_never_returned() {
        let control = control_with(vec![]);
        assert!(control.get_attribute("user.password").is_none());
    }
}
