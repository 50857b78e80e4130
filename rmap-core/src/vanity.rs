//! Vanity-path index: `sling:vanityPath` resources mapped to redirect
//! entries, guarded by a Bloom filter and a reverse target-path index.

use crate::bloom::BloomFilter;
use crate::config::VanityConfig;
use crate::resolve_map::ResolveEntry;
use crate::resource::Resource;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

const WARMUP_CACHE_CAP: usize = 10_000;

#[derive(Default)]
pub struct VanityMetrics {
    pub lookups: AtomicU64,
    pub bloom_negatives: AtomicU64,
    pub bloom_false_positives: AtomicU64,
    pub vanity_paths_count: AtomicU64,
    pub resources_with_vanity_paths_on_startup: AtomicU64,
}

/// Scheme+host wildcard that every non-URL vanity pattern is rooted at:
/// the request path seen by the resolver carries the authority ahead of
/// the path, and this index does not model per-host vanity paths.
const HOST_PREFIX: &str = "[^/]+/[^/]+";

/// Builds the two `ResolveEntry`s a single vanity path value produces:
/// an exact match and an extension-chain match, rooted at `HOST_PREFIX`
/// unless the value is already a full URL.
fn build_entries(target: &str, value: &str, status: i32) -> Vec<(String, ResolveEntry)> {
    let (prefix, vanity_key) = if value.contains("://") {
        (String::new(), value.to_string())
    } else {
        let v = if value.starts_with('/') { value.to_string() } else { format!("/{value}") };
        (HOST_PREFIX.to_string(), v)
    };

    let target_has_extension = crate::path::name(target).contains('.');
    let exact_redirect = if target_has_extension {
        target.to_string()
    } else {
        format!("{target}.html")
    };

    // `prefix` is itself a regex fragment (or empty), so only the vanity
    // key is escaped.
    let exact_pattern = format!("^{}{}$", prefix, regex::escape(&vanity_key));
    let exact = ResolveEntry {
        pattern: Regex::new(&exact_pattern).expect("vanity exact pattern"),
        redirects: vec![exact_redirect],
        status,
        order: 0,
        trailing_slash: false,
    };

    let chain_pattern = format!("^{}{}(\\..*)?$", prefix, regex::escape(&vanity_key));
    let chain_redirect = if target_has_extension {
        format!("{target}$1")
    } else {
        format!("{target}.html$1")
    };
    let chain = ResolveEntry {
        pattern: Regex::new(&chain_pattern).expect("vanity chain pattern"),
        redirects: vec![chain_redirect],
        status,
        order: 1,
        trailing_slash: false,
    };

    vec![(vanity_key.clone(), exact), (vanity_key, chain)]
}

/// External source of vanity entries, consulted on a warm-cache miss that
/// the Bloom filter did not rule out.
pub trait VanitySource {
    fn get_vanity_paths(&self, key: &str) -> crate::Result<Vec<ResolveEntry>>;
}

pub struct VanityPathIndex {
    resolve_map: DashMap<String, Vec<ResolveEntry>>,
    reverse: DashMap<String, Vec<String>>,
    bloom: BloomFilter,
    warmup_cache: Mutex<LruCache<String, Vec<ResolveEntry>>>,
    pub metrics: VanityMetrics,
    max_entries: i64,
    ignore_cap_on_startup: bool,
    allow_list: Vec<String>,
    deny_list: Vec<String>,
}

impl VanityPathIndex {
    pub fn new(config: &VanityConfig) -> Self {
        Self {
            resolve_map: DashMap::new(),
            reverse: DashMap::new(),
            bloom: BloomFilter::new(config.vanity_bloom_filter_max_bytes),
            warmup_cache: Mutex::new(LruCache::new(NonZeroUsize::new(WARMUP_CACHE_CAP).unwrap())),
            metrics: VanityMetrics::default(),
            max_entries: config.vanity_path_max_entries,
            ignore_cap_on_startup: config.vanity_path_max_entries_on_startup,
            allow_list: config.vanity_path_allow_list.clone(),
            deny_list: config.vanity_path_deny_list.clone(),
        }
    }

    fn at_capacity(&self) -> bool {
        self.max_entries >= 0 && self.resolve_map.len() as i64 >= self.max_entries
    }

    /// Mirrors `Config::is_valid_vanity_path`'s allow/deny prefix check,
    /// applied to the source resource's own path.
    fn source_allowed(&self, path: &str) -> bool {
        if self.deny_list.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        self.allow_list.is_empty() || self.allow_list.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Index one resource's `sling:vanityPath` values. Always updates the
    /// Bloom filter; only adds map entries while under `vanity_path_max_entries`
    /// (or unconditionally during startup if configured to ignore the cap).
    pub fn add_resource(&self, resource: &Resource, default_status: i32, during_startup: bool) {
        let values = resource.string_values("sling:vanityPath");
        if values.is_empty() || !self.source_allowed(&resource.path) {
            return;
        }
        let status = if resource.bool_value("sling:redirect").unwrap_or(false) {
            resource.i64_value("sling:redirectStatus").map(|s| s as i32).unwrap_or(default_status)
        } else {
            -1
        };

        self.metrics.resources_with_vanity_paths_on_startup.fetch_add(1, Ordering::Relaxed);
        let mut keys_for_target = Vec::new();
        let allow_overflow = during_startup && self.ignore_cap_on_startup;

        for value in values {
            for (key, entry) in build_entries(&resource.path, &value, status) {
                self.bloom.add(&key);
                keys_for_target.push(key.clone());
                if allow_overflow || !self.at_capacity() {
                    self.resolve_map.entry(key).or_default().push(entry);
                    self.metrics.vanity_paths_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if !keys_for_target.is_empty() {
            self.reverse.insert(resource.path.clone(), keys_for_target);
        }
    }

    /// Drop every vanity entry that targeted `target_path`.
    pub fn remove_target(&self, target_path: &str) {
        if let Some((_, keys)) = self.reverse.remove(target_path) {
            for key in keys {
                if self.resolve_map.remove(&key).is_some() {
                    self.metrics.vanity_paths_count.fetch_sub(2, Ordering::Relaxed);
                }
            }
        }
    }

    /// Warm lookup path: Bloom filter short-circuit, then the resolve map.
    /// Call only once the index has completed its initial scan.
    pub fn lookup(&self, key: &str) -> Vec<ResolveEntry> {
        self.bump_lookups();
        if !self.bloom.probably_contains(key) {
            self.metrics.bloom_negatives.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }
        match self.resolve_map.get(key) {
            Some(entries) => entries.clone(),
            None => {
                self.metrics.bloom_false_positives.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        }
    }

    /// Lookup that also falls back to an external source on a cache miss
    /// that the Bloom filter did not rule out, for entries above the
    /// `vanity_path_max_entries` cap that never made it into `resolve_map`.
    pub fn lookup_with_source(&self, key: &str, source: &dyn VanitySource) -> crate::Result<Vec<ResolveEntry>> {
        self.bump_lookups();
        if !self.bloom.probably_contains(key) {
            self.metrics.bloom_negatives.fetch_add(1, Ordering::Relaxed);
            return Ok(Vec::new());
        }
        if let Some(entries) = self.resolve_map.get(key) {
            return Ok(entries.clone());
        }
        let fetched = source.get_vanity_paths(key)?;
        if fetched.is_empty() {
            self.metrics.bloom_false_positives.fetch_add(1, Ordering::Relaxed);
        }
        Ok(fetched)
    }

    fn bump_lookups(&self) {
        let prev = self.metrics.lookups.fetch_add(1, Ordering::Relaxed);
        if prev == u64::MAX - 1 {
            // reset together so the negative/false-positive ratios stay comparable
            self.metrics.lookups.store(0, Ordering::Relaxed);
            self.metrics.bloom_negatives.store(0, Ordering::Relaxed);
            self.metrics.bloom_false_positives.store(0, Ordering::Relaxed);
        }
    }

    /// Fallback consulted while the background warm-up scan is still
    /// running. A hit and a miss are both counted as lookups.
    pub fn warmup_get(&self, key: &str) -> Option<Vec<ResolveEntry>> {
        self.bump_lookups();
        self.warmup_cache.lock().get(key).cloned()
    }

    pub fn warmup_put(&self, key: String, entries: Vec<ResolveEntry>) {
        self.warmup_cache.lock().put(key, entries);
    }

    /// Vanity keys registered against `target`, used by `ResourceMapper`
    /// to append vanity URLs as low-priority candidates for a resource.
    pub fn keys_for_target(&self, target: &str) -> Vec<String> {
        self.reverse.get(target).map(|v| v.value().clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.resolve_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolve_map.is_empty()
    }

    pub fn clear(&self) {
        self.resolve_map.clear();
        self.reverse.clear();
        self.bloom.clear();
        self.warmup_cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> VanityConfig {
        VanityConfig::default()
    }

    fn resource_with_vanity(path: &str, vanity: &[&str]) -> Resource {
        Resource::new(path, "nt:unstructured").with_property("sling:vanityPath", json!(vanity))
    }

    #[test]
    fn exact_and_extension_entries_are_indexed() {
        let index = VanityPathIndex::new(&config());
        index.add_resource(&resource_with_vanity("/content/foo", &["special"]), 302, false);
        let hits = index.lookup("/special");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|e| e.matches("example.com/443/special")));
        assert!(hits.iter().any(|e| e.matches("example.com/443/special.html")));
    }

    #[test]
    fn bloom_negative_short_circuits_and_is_counted() {
        let index = VanityPathIndex::new(&config());
        index.add_resource(&resource_with_vanity("/content/foo", &["special"]), 302, false);
        let hits = index.lookup("/never-seen");
        assert!(hits.is_empty());
        assert_eq!(index.metrics.bloom_negatives.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn remove_target_clears_reverse_mapped_entries() {
        let index = VanityPathIndex::new(&config());
        index.add_resource(&resource_with_vanity("/content/foo", &["special"]), 302, false);
        assert!(!index.lookup("/special").is_empty());
        index.remove_target("/content/foo");
        assert!(index.is_empty());
    }

    #[test]
    fn cap_limits_resolve_map_but_bloom_still_updated() {
        let mut cfg = config();
        cfg.vanity_path_max_entries = 0;
        let index = VanityPathIndex::new(&cfg);
        index.add_resource(&resource_with_vanity("/content/foo", &["special"]), 302, false);
        assert!(index.is_empty());
        assert!(index.bloom.probably_contains("/special"));
    }

    #[test]
    fn deny_listed_source_path_is_ignored() {
        let mut cfg = config();
        cfg.vanity_path_deny_list = vec!["/content/secret".to_string()];
        let index = VanityPathIndex::new(&cfg);
        index.add_resource(&resource_with_vanity("/content/secret/foo", &["special"]), 302, false);
        assert!(index.lookup("/special").is_empty());
    }

    #[test]
    fn allow_list_excludes_paths_outside_it() {
        let mut cfg = config();
        cfg.vanity_path_allow_list = vec!["/content/public".to_string()];
        let index = VanityPathIndex::new(&cfg);
        index.add_resource(&resource_with_vanity("/content/other", &["special"]), 302, false);
        assert!(index.lookup("/special").is_empty());
    }

    #[test]
    fn redirect_status_defaults_when_flag_set_without_explicit_status() {
        let index = VanityPathIndex::new(&config());
        let resource = resource_with_vanity("/content/foo", &["special"]).with_property("sling:redirect", json!(true));
        index.add_resource(&resource, 302, false);
        let hits = index.lookup("/special");
        assert!(hits.iter().any(|e| e.status == 302));
    }
}
