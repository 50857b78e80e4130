//! Reference in-memory `StorageProvider` used by tests and demo binaries.
//!
//! This is explicitly a test/demo double, not a production storage
//! adapter — concrete adapters remain out of scope for this crate.

use crate::paged_query::PagedQuerySource;
use crate::provider::StorageProvider;
use crate::resource::Resource;
use crate::vanity::VanitySource;
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryBackend {
    resources: RwLock<BTreeMap<String, Resource>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: Vec<Resource>) -> Self {
        let backend = Self::new();
        for resource in resources {
            backend.put(resource);
        }
        backend
    }

    pub fn put(&self, resource: Resource) {
        self.resources.write().insert(resource.path.clone(), resource);
    }

    pub fn remove(&self, path: &str) {
        self.resources.write().remove(path);
    }

    pub fn all(&self) -> Vec<Resource> {
        self.resources.read().values().cloned().collect()
    }
}

impl StorageProvider for MemoryBackend {
    fn get(&self, path: &str) -> Result<Option<Resource>> {
        Ok(self.resources.read().get(path).cloned())
    }

    fn list_children(&self, path: &str) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .read()
            .values()
            .filter(|r| crate::path::parent(&r.path).as_deref() == Some(path))
            .cloned()
            .collect())
    }

    fn create(&self, path: &str, props: serde_json::Value) -> Result<Resource> {
        let mut resource = Resource::new(path, "nt:unstructured");
        if let serde_json::Value::Object(map) = props {
            for (k, v) in map {
                resource.properties.insert(k, v);
            }
        }
        self.put(resource.clone());
        Ok(resource)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.remove(path);
        Ok(())
    }

    fn find_resources(&self, query: &str, language: &str) -> Result<Vec<Resource>> {
        if language != "plain" {
            return Err(crate::MapError::QueryUnsupported(language.to_string()));
        }
        Ok(self
            .resources
            .read()
            .values()
            .filter(|r| r.path.contains(query))
            .cloned()
            .collect())
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["plain".to_string()]
    }
}

impl PagedQuerySource for MemoryBackend {
    fn fetch_page(&self, after: Option<(&str, &str)>, page_size: usize) -> Result<Vec<Resource>> {
        let resources = self.resources.read();
        let mut rows: Vec<&Resource> = resources
            .values()
            .filter(|r| !r.string_values("sling:vanityPath").is_empty())
            .collect();
        rows.sort_by(|a, b| {
            let ka = a.string_values("sling:vanityPath").into_iter().next().unwrap_or_default();
            let kb = b.string_values("sling:vanityPath").into_iter().next().unwrap_or_default();
            ka.cmp(&kb).then(a.path.cmp(&b.path))
        });
        let start = match after {
            None => 0,
            Some((key, path)) => rows
                .iter()
                .position(|r| {
                    let k = r.string_values("sling:vanityPath").into_iter().next().unwrap_or_default();
                    (k.as_str(), r.path.as_str()) > (key, path)
                })
                .unwrap_or(rows.len()),
        };
        Ok(rows[start..].iter().take(page_size).map(|r| (*r).clone()).collect())
    }
}

impl VanitySource for MemoryBackend {
    fn get_vanity_paths(&self, key: &str) -> Result<Vec<crate::resolve_map::ResolveEntry>> {
        let _ = key;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_round_trip() {
        let backend = MemoryBackend::new();
        backend.put(Resource::new("/content/foo", "nt:unstructured"));
        assert!(backend.get("/content/foo").unwrap().is_some());
        assert!(backend.get("/content/bar").unwrap().is_none());
    }

    #[test]
    fn list_children_filters_by_parent() {
        let backend = MemoryBackend::new();
        backend.put(Resource::new("/content/foo", "nt:unstructured"));
        backend.put(Resource::new("/content/bar", "nt:unstructured"));
        backend.put(Resource::new("/other/baz", "nt:unstructured"));
        let children = backend.list_children("/content").unwrap();
        assert_eq!(children.len(), 2);
    }
}
