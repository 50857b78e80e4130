//! Coordinator owning the alias index, vanity-path index, and global
//! resolve map, plus the locking/warm-up/change-propagation protocol that
//! keeps them consistent.

use crate::alias::AliasIndex;
use crate::config::Config;
use crate::resolve_map::{ResolveEntry, ResolveMap};
use crate::resource::Resource;
use crate::vanity::VanityPathIndex;
use crate::{MapError, Result};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PENDING_QUEUE_CAP: usize = 10_000;
const DISPOSE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum ResourceChange {
    Added(Resource),
    Updated(Resource),
    Removed(String),
}

impl ResourceChange {
    fn path(&self) -> &str {
        match self {
            ResourceChange::Added(r) | ResourceChange::Updated(r) => &r.path,
            ResourceChange::Removed(p) => p,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Cold = 0,
    Warming = 1,
    Warm = 2,
    Disposed = 3,
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            0 => LifecycleState::Cold,
            1 => LifecycleState::Warming,
            2 => LifecycleState::Warm,
            _ => LifecycleState::Disposed,
        }
    }
}

/// Process-wide coordinator for the alias/vanity/resolve-map indices.
///
/// Index *lookups* never take `init_lock` — they read through the
/// concurrent maps directly and may observe a slightly stale snapshot
/// while a rebuild is in flight. Index *mutation* (full rebuild or
/// incremental change application) always holds `init_lock`, mirroring
/// the single process-wide `ReentrantLock` in the concurrency design.
pub struct MapEntries {
    config: Config,
    alias_index: AliasIndex,
    vanity_index: VanityPathIndex,
    resolve_map: RwLock<ResolveMap>,
    init_lock: ReentrantMutex<()>,
    state: AtomicU8,
    pending: Mutex<VecDeque<ResourceChange>>,
    change_generation: AtomicU64,
    unclosed_resolvers: AtomicU64,
}

impl MapEntries {
    pub fn new(config: Config) -> Arc<Self> {
        let vanity_index = VanityPathIndex::new(&config.vanity);
        Arc::new(Self {
            config,
            alias_index: AliasIndex::new(),
            vanity_index,
            resolve_map: RwLock::new(ResolveMap::new()),
            init_lock: ReentrantMutex::new(()),
            state: AtomicU8::new(LifecycleState::Cold as u8),
            pending: Mutex::new(VecDeque::new()),
            change_generation: AtomicU64::new(0),
            unclosed_resolvers: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn alias_index(&self) -> &AliasIndex {
        &self.alias_index
    }

    pub fn vanity_index(&self) -> &VanityPathIndex {
        &self.vanity_index
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn change_generation(&self) -> u64 {
        self.change_generation.load(Ordering::Relaxed)
    }

    /// Synchronous full scan: builds the alias and vanity indices and the
    /// static resolve map from `resources`/`static_entries` in one pass on
    /// the calling thread (`vanity_path_cache_init_in_background = false`).
    pub fn initialize(&self, resources: &[Resource], static_entries: Vec<ResolveEntry>) {
        let _guard = self.init_lock.lock();
        self.set_state(LifecycleState::Warming);
        self.run_scan(resources, static_entries);
        self.set_state(LifecycleState::Warm);
    }

    /// Background scan: spawns a dedicated worker thread. Change events
    /// arriving while it runs are queued; after the scan completes the
    /// worker drains the queue twice (the second pass catches events that
    /// arrived mid-drain) before flipping to `Warm`.
    pub fn initialize_in_background(self: &Arc<Self>, resources: Vec<Resource>, static_entries: Vec<ResolveEntry>) {
        self.set_state(LifecycleState::Warming);
        let this = Arc::clone(self);
        std::thread::spawn(move || {
            let _guard = this.init_lock.lock();
            this.run_scan(&resources, static_entries);
            for _ in 0..2 {
                this.drain_pending_locked();
            }
            this.set_state(LifecycleState::Warm);
        });
    }

    /// True if `path` falls under one of `allowed_alias_locations`, or the
    /// list is empty (meaning "every subtree is eligible").
    fn alias_location_allowed(&self, path: &str) -> bool {
        let locations = &self.config.alias.allowed_alias_locations;
        locations.is_empty() || locations.iter().any(|root| crate::path::is_ancestor_or_self(root, path))
    }

    /// True if `path` falls under one of `observation_paths`, or the list
    /// is empty (meaning "observe everything").
    fn observed(&self, path: &str) -> bool {
        let paths = &self.config.core.observation_paths;
        paths.is_empty() || paths.iter().any(|root| crate::path::is_ancestor_or_self(root, path))
    }

    fn run_scan(&self, resources: &[Resource], static_entries: Vec<ResolveEntry>) {
        self.alias_index
            .initialize(resources.iter().filter(|r| self.alias_location_allowed(&r.path)));
        self.vanity_index.clear();
        for resource in resources {
            self.vanity_index.add_resource(
                resource,
                self.config.vanity.default_vanity_path_redirect_status as i32,
                true,
            );
        }
        *self.resolve_map.write() = ResolveMap::rebuild(static_entries);
    }

    fn drain_pending_locked(&self) {
        let batch: Vec<ResourceChange> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        for change in &batch {
            self.apply_change(change);
        }
    }

    /// Apply a batch of repository changes in order. While warming up,
    /// changes are enqueued instead of applied immediately; once warm,
    /// applying a non-empty batch publishes exactly one change
    /// notification (a bumped `change_generation`).
    pub fn on_change(&self, changes: Vec<ResourceChange>) -> Result<()> {
        if self.state() == LifecycleState::Disposed {
            return Err(MapError::Disposed);
        }
        let changes: Vec<ResourceChange> = changes.into_iter().filter(|c| self.observed(c.path())).collect();
        if changes.is_empty() {
            return Ok(());
        }
        if self.state() == LifecycleState::Warming {
            let mut pending = self.pending.lock();
            if pending.len() + changes.len() > PENDING_QUEUE_CAP {
                tracing::warn!(
                    queued = pending.len(),
                    incoming = changes.len(),
                    "pending change queue near capacity during warm-up"
                );
            }
            pending.extend(changes);
            return Ok(());
        }
        let _guard = self.init_lock.lock();
        for change in &changes {
            self.apply_change(change);
        }
        self.change_generation.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn apply_change(&self, change: &ResourceChange) {
        match change {
            ResourceChange::Added(r) | ResourceChange::Updated(r) => {
                if self.alias_location_allowed(&r.path) {
                    self.alias_index.add_resource(r);
                }
                self.vanity_index.add_resource(
                    r,
                    self.config.vanity.default_vanity_path_redirect_status as i32,
                    false,
                );
            }
            ResourceChange::Removed(path) => {
                self.alias_index.remove_subtree(path);
                self.vanity_index.remove_target(path);
            }
        }
    }

    /// Merge the global resolve map and the vanity-path index for `key`.
    /// On a vanity-index miss, strip the trailing selector/extension chain
    /// and retry one
    /// path segment up, down to `/`.
    pub fn resolve_entries(&self, key: &str) -> Vec<ResolveEntry> {
        let global = self.resolve_map.read().best_match(key).cloned();
        let specials = self.vanity_candidates(key);

        match (global, specials.is_empty()) {
            (Some(g), false) => {
                let vanity_wins = self.config.vanity.vanity_path_precedence
                    || specials[0].pattern.as_str().len() > g.pattern.as_str().len();
                if vanity_wins {
                    let mut merged = specials;
                    merged.push(g);
                    merged
                } else {
                    let mut merged = vec![g];
                    merged.extend(specials);
                    merged
                }
            }
            (Some(g), true) => vec![g],
            (None, false) => specials,
            (None, true) => Vec::new(),
        }
    }

    fn vanity_candidates(&self, key: &str) -> Vec<ResolveEntry> {
        let mut current = key.to_string();
        loop {
            let hits = self.vanity_index.lookup(&current);
            if !hits.is_empty() {
                return hits;
            }
            if current == "/" {
                return Vec::new();
            }
            let (stem, suffix) = crate::path::split_selectors(&current);
            if !suffix.is_empty() {
                current = stem.to_string();
                continue;
            }
            let next = crate::path::parent(&current).unwrap_or_else(|| "/".to_string());
            if next == current {
                return Vec::new();
            }
            current = next;
        }
    }

    pub fn track_resolver_opened(&self) {
        self.unclosed_resolvers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_resolver_closed(&self) {
        self.unclosed_resolvers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn unclosed_resolvers(&self) -> u64 {
        self.unclosed_resolvers.load(Ordering::Relaxed)
    }

    /// Attempt to acquire the init lock within the dispose timeout; the
    /// caller proceeds regardless, since the resolver reference is
    /// unconditionally invalidated either way.
    pub fn dispose(&self) {
        if self.init_lock.try_lock_for(DISPOSE_LOCK_TIMEOUT).is_none() {
            tracing::warn!("dispose proceeding without the init lock after a 10s timeout");
        }
        self.alias_index.initialize(std::iter::empty::<&Resource>());
        self.vanity_index.clear();
        *self.resolve_map.write() = ResolveMap::new();
        self.set_state(LifecycleState::Disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vanity_resource(path: &str, vanity: &str) -> Resource {
        Resource::new(path, "nt:unstructured").with_property("sling:vanityPath", json!([vanity]))
    }

    #[test]
    fn synchronous_initialize_reaches_warm() {
        let entries = MapEntries::new(Config::default());
        entries.initialize(&[vanity_resource("/content/foo", "special")], Vec::new());
        assert_eq!(entries.state(), LifecycleState::Warm);
        assert!(!entries.resolve_entries("/special").is_empty());
    }

    #[test]
    fn on_change_while_warming_is_queued_not_applied() {
        let entries = MapEntries::new(Config::default());
        entries.set_state(LifecycleState::Warming);
        entries
            .on_change(vec![ResourceChange::Added(vanity_resource("/content/foo", "special"))])
            .unwrap();
        assert!(entries.resolve_entries("/special").is_empty());
        assert_eq!(entries.pending.lock().len(), 1);
    }

    #[test]
    fn on_change_while_warm_applies_immediately_and_bumps_generation() {
        let entries = MapEntries::new(Config::default());
        entries.initialize(&[], Vec::new());
        let before = entries.change_generation();
        entries
            .on_change(vec![ResourceChange::Added(vanity_resource("/content/foo", "special"))])
            .unwrap();
        assert!(!entries.resolve_entries("/special").is_empty());
        assert_eq!(entries.change_generation(), before + 1);
    }

    #[test]
    fn on_change_after_dispose_is_rejected() {
        let entries = MapEntries::new(Config::default());
        entries.initialize(&[], Vec::new());
        entries.dispose();
        let err = entries
            .on_change(vec![ResourceChange::Removed("/content/foo".to_string())])
            .unwrap_err();
        assert!(matches!(err, MapError::Disposed));
    }

    #[test]
    fn resolve_entries_merges_global_and_vanity_by_pattern_length() {
        let entries = MapEntries::new(Config::default());
        let global = ResolveEntry::internal("^/special$", "/content/other", 0);
        entries.initialize(&[vanity_resource("/content/foo", "special")], vec![global]);
        let merged = entries.resolve_entries("/special");
        // the vanity pattern carries the scheme+host wildcard prefix, so it
        // is strictly longer than the bare global pattern here; vanity wins.
        assert_eq!(merged[0].redirects[0], "/content/foo.html");
    }

    #[test]
    fn resolve_entries_exact_pattern_length_tie_goes_to_global() {
        let entries = MapEntries::new(Config::default());
        // the vanity index always roots a non-URL pattern at the
        // scheme+host wildcard, so an exact tie requires a global pattern
        // built to the same length as "^[^/]+/[^/]+/special$".
        let vanity_pattern = "^[^/]+/[^/]+/special$";
        let inner = "a".repeat(vanity_pattern.len() - 2);
        let global_pattern = format!("^{inner}$");
        let global = ResolveEntry::internal(&global_pattern, "/content/other", 0);
        entries.initialize(&[vanity_resource("/content/foo", "special")], vec![global]);
        let merged = entries.resolve_entries("/special");
        assert_eq!(merged[0].redirects[0], "/content/other");
    }

    #[test]
    fn resolve_entries_walks_up_segments_on_vanity_miss() {
        let entries = MapEntries::new(Config::default());
        entries.initialize(&[vanity_resource("/content/foo", "special")], Vec::new());
        let merged = entries.resolve_entries("/special.print.html");
        assert!(!merged.is_empty());
    }

    fn alias_resource(path: &str, alias: &str) -> Resource {
        Resource::new(path, "nt:unstructured").with_property("sling:alias", json!([alias]))
    }

    #[test]
    fn allowed_alias_locations_restricts_initial_scan() {
        let mut config = Config::default();
        config.alias.allowed_alias_locations = vec!["/content/allowed".to_string()];
        let entries = MapEntries::new(config);
        entries.initialize(
            &[alias_resource("/content/allowed/foo", "f"), alias_resource("/content/other/bar", "b")],
            Vec::new(),
        );
        assert_eq!(entries.alias_index().aliases_for("/content/allowed", "foo"), vec!["f"]);
        assert!(entries.alias_index().aliases_for("/content/other", "bar").is_empty());
    }

    #[test]
    fn observation_paths_filters_out_of_scope_changes() {
        let mut config = Config::default();
        config.core.observation_paths = vec!["/content/watched".to_string()];
        let entries = MapEntries::new(config);
        entries.initialize(&[], Vec::new());
        entries
            .on_change(vec![ResourceChange::Added(vanity_resource("/content/unwatched", "special"))])
            .unwrap();
        assert!(entries.resolve_entries("/special").is_empty());
    }
}
