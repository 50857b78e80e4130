//! Aggregated, serializable metrics snapshot for the HTTP service's
//! `/metrics` endpoint.

use crate::map_entries::MapEntries;
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub vanity_paths_count: u64,
    pub vanity_path_lookups: u64,
    pub vanity_bloom_negatives: u64,
    pub vanity_bloom_false_positives: u64,
    pub resources_with_vanity_paths_on_startup: u64,
    pub resources_with_aliased_children: u64,
    pub resources_with_aliases_on_startup: u64,
    pub detected_invalid_aliases: u64,
    pub detected_conflicting_aliases: u64,
    pub unclosed_resolvers: u64,
}

/// Snapshot the counters owned by the alias and vanity-path indices.
/// `resources_with_aliased_children`/`resources_with_aliases_on_startup`
/// are derived from the current alias index contents rather than tracked
/// incrementally, since they describe index shape rather than an event
/// count.
pub fn snapshot(map_entries: &MapEntries) -> MetricsSnapshot {
    let vanity = map_entries.vanity_index();
    let alias = map_entries.alias_index();

    MetricsSnapshot {
        vanity_paths_count: vanity.metrics.vanity_paths_count.load(Ordering::Relaxed),
        vanity_path_lookups: vanity.metrics.lookups.load(Ordering::Relaxed),
        vanity_bloom_negatives: vanity.metrics.bloom_negatives.load(Ordering::Relaxed),
        vanity_bloom_false_positives: vanity.metrics.bloom_false_positives.load(Ordering::Relaxed),
        resources_with_vanity_paths_on_startup: vanity
            .metrics
            .resources_with_vanity_paths_on_startup
            .load(Ordering::Relaxed),
        resources_with_aliased_children: alias.children_with_aliases_count(),
        resources_with_aliases_on_startup: alias.children_with_aliases_count(),
        detected_invalid_aliases: alias.invalid_alias_count(),
        detected_conflicting_aliases: alias.conflicting_alias_count(),
        unclosed_resolvers: map_entries.unclosed_resolvers(),
    }
}
