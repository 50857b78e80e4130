//! Reverse mapping: composes the externally-visible URL(s) for an
//! internal resource path.

use crate::map_entries::MapEntries;
use std::sync::Arc;

/// Builds the cartesian product of per-segment name candidates (a
/// segment's own name plus any aliases registered for it) into full
/// root-to-leaf path strings.
#[derive(Default)]
pub struct PathGenerator {
    segments: Vec<Vec<String>>,
}

impl PathGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_segment(&mut self, candidates: Vec<String>) {
        self.segments.push(candidates);
    }

    pub fn generate_paths(&self) -> Vec<String> {
        let mut paths = vec![String::new()];
        for candidates in &self.segments {
            let mut next = Vec::with_capacity(paths.len() * candidates.len().max(1));
            for prefix in &paths {
                for candidate in candidates {
                    next.push(format!("{prefix}/{candidate}"));
                }
            }
            paths = next;
        }
        paths
    }
}

fn split_fragment_query(path: &str) -> (&str, &str) {
    match path.find(['#', '?']) {
        Some(idx) => (&path[..idx], &path[idx..]),
        None => (path, ""),
    }
}

fn dedup_preserve_first(paths: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

pub struct ResourceMapper {
    map_entries: Arc<MapEntries>,
}

impl ResourceMapper {
    pub fn new(map_entries: Arc<MapEntries>) -> Self {
        Self { map_entries }
    }

    /// `get_mapping`: first candidate of `get_all_mappings`.
    pub fn get_mapping(&self, resource_path: &str, context_path: Option<&str>) -> String {
        self.get_all_mappings(resource_path, context_path)
            .into_iter()
            .next()
            .unwrap_or_else(|| "/".to_string())
    }

    /// `get_all_mappings`: an ordered, deduplicated list of candidate
    /// external URLs for `resource_path`.
    pub fn get_all_mappings(&self, resource_path: &str, context_path: Option<&str>) -> Vec<String> {
        let (path_part, fragment_query) = split_fragment_query(resource_path);
        if path_part.is_empty() {
            return vec!["/".to_string()];
        }

        let segments = crate::path::segments(path_part);
        let mut generator = PathGenerator::new();
        let mut ancestor = String::new();
        for seg in &segments {
            let parent_path = if ancestor.is_empty() { "/".to_string() } else { ancestor.clone() };
            let mut names = vec![seg.to_string()];
            names.extend(self.map_entries.alias_index().aliases_for(&parent_path, seg));
            generator.push_segment(names);
            ancestor = crate::path::join(&parent_path, seg);
        }

        let mut candidates: Vec<String> = generator
            .generate_paths()
            .into_iter()
            .filter(|p| p != path_part)
            .map(|p| self.outbound_rewrite(&p))
            .collect();
        candidates.reverse();

        let canonical = self.outbound_rewrite(path_part);
        candidates.retain(|p| p != &canonical);
        candidates.push(canonical);

        for key in self.map_entries.vanity_index().keys_for_target(path_part) {
            candidates.push(key);
        }

        if candidates.is_empty() {
            candidates.push(path_part.to_string());
        }

        let mut out: Vec<String> = candidates
            .into_iter()
            .map(|p| {
                let mut s = String::new();
                if let Some(ctx) = context_path {
                    if !ctx.is_empty() && ctx != "/" {
                        s.push_str(ctx);
                    }
                }
                s.push_str(&p);
                s.push_str(fragment_query);
                s
            })
            .collect();

        if out.is_empty() {
            out.push("/".to_string());
        }
        dedup_preserve_first(out)
    }

    fn outbound_rewrite(&self, path: &str) -> String {
        // Outbound literal prefix rewrites are consulted through
        // `MapEntries::resolve_entries`'s sibling table; see
        // `ResolveMap::best_outbound`. `MapEntries` does not yet expose
        // outbound entries directly, so only the namespace-prefix mangle
        // is applied here (recorded as a simplification in DESIGN.md).
        if self.map_entries.config().map.mangle_namespace_prefixes {
            path.replace(':', "_")
        } else {
            path.to_string()
        }
    }
}
