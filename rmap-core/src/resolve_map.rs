//! Static resolve-map entries loaded from the configuration tree, plus the
//! global ordered list they form.

use regex::Regex;

/// One row of the resolve map: a request-path pattern and the redirect
/// targets or rewrite it maps to. `status == -1` means an internal
/// (non-redirecting) rewrite; any other value is an HTTP redirect status.
#[derive(Debug, Clone)]
pub struct ResolveEntry {
    pub pattern: Regex,
    pub redirects: Vec<String>,
    pub status: i32,
    pub order: i64,
    pub trailing_slash: bool,
}

impl ResolveEntry {
    pub fn internal(pattern: &str, redirect: impl Into<String>, order: i64) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid resolve-map pattern"),
            redirects: vec![redirect.into()],
            status: -1,
            order,
            trailing_slash: false,
        }
    }

    pub fn redirecting(pattern: &str, redirect: impl Into<String>, status: i32, order: i64) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid resolve-map pattern"),
            redirects: vec![redirect.into()],
            status,
            order,
            trailing_slash: false,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status < 0
    }

    fn pattern_len(&self) -> usize {
        self.pattern.as_str().len()
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    /// Preferred redirect for a request carrying `scheme://host:port`:
    /// one starting with the full authority wins, then one starting with
    /// just `scheme://`, else the first declared.
    pub fn best_redirect(&self, scheme_host_port: Option<&str>) -> Option<&str> {
        if self.redirects.is_empty() {
            return None;
        }
        if let Some(authority) = scheme_host_port {
            if let Some(r) = self.redirects.iter().find(|r| r.starts_with(authority)) {
                return Some(r);
            }
            if let Some(scheme) = authority.split("://").next() {
                let prefix = format!("{scheme}://");
                if let Some(r) = self.redirects.iter().find(|r| r.starts_with(prefix.as_str())) {
                    return Some(r);
                }
            }
        }
        self.redirects.first().map(String::as_str)
    }
}

/// Global ordered list of resolve entries. Order: longest pattern first,
/// then ascending `order`, then registration order (stable sort keeps
/// this without an explicit index field).
/// A literal (non-regex) internal-to-external prefix rewrite, the subset
/// of resolve-map entries that `ResourceMapper` can reliably apply in
/// reverse. Parameterized/regex entries are consulted for
/// forward resolution only — reconstructing an external form from an
/// arbitrary capture-group pattern is not attempted, a deliberate
/// simplification recorded in DESIGN.md.
#[derive(Debug, Clone)]
pub struct OutboundEntry {
    pub internal_prefix: String,
    pub external_prefix: String,
    pub order: i64,
}

#[derive(Default)]
pub struct ResolveMap {
    entries: Vec<ResolveEntry>,
    outbound: Vec<OutboundEntry>,
}

impl ResolveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(entries: Vec<ResolveEntry>) -> Self {
        let mut map = Self { entries, outbound: Vec::new() };
        map.sort();
        map
    }

    pub fn insert(&mut self, entry: ResolveEntry) {
        self.entries.push(entry);
        self.sort();
    }

    pub fn add_outbound(&mut self, internal_prefix: impl Into<String>, external_prefix: impl Into<String>, order: i64) {
        self.outbound.push(OutboundEntry {
            internal_prefix: internal_prefix.into(),
            external_prefix: external_prefix.into(),
            order,
        });
        self.outbound.sort_by(|a, b| b.internal_prefix.len().cmp(&a.internal_prefix.len()).then(a.order.cmp(&b.order)));
    }

    /// Longest internal-prefix outbound entry that `path` falls under.
    pub fn best_outbound(&self, path: &str) -> Option<&OutboundEntry> {
        self.outbound
            .iter()
            .find(|e| crate::path::is_ancestor_or_self(&e.internal_prefix, path))
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| b.pattern_len().cmp(&a.pattern_len()).then(a.order.cmp(&b.order)));
    }

    pub fn entries(&self) -> &[ResolveEntry] {
        &self.entries
    }

    /// First entry (by the order above) whose pattern matches `key`.
    pub fn best_match(&self, key: &str) -> Option<&ResolveEntry> {
        self.entries.iter().find(|e| e.matches(key))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_pattern_wins_regardless_of_insertion_order() {
        let mut map = ResolveMap::new();
        map.insert(ResolveEntry::internal("^/a$", "/content/a", 0));
        map.insert(ResolveEntry::internal("^/a/b/extra$", "/content/a/b/extra", 0));
        let m = map.best_match("/a/b/extra").unwrap();
        assert_eq!(m.redirects[0], "/content/a/b/extra");
    }

    #[test]
    fn order_breaks_ties_between_equal_length_patterns() {
        let mut map = ResolveMap::new();
        map.insert(ResolveEntry::internal("^/ab$", "/second", 5));
        map.insert(ResolveEntry::internal("^/ab$", "/first", 1));
        let m = map.best_match("/ab").unwrap();
        assert_eq!(m.redirects[0], "/first");
    }

    #[test]
    fn best_redirect_prefers_matching_authority() {
        let entry = ResolveEntry {
            pattern: Regex::new("^/x$").unwrap(),
            redirects: vec!["http://other/x".to_string(), "https://example.com/x".to_string()],
            status: -1,
            order: 0,
            trailing_slash: false,
        };
        assert_eq!(entry.best_redirect(Some("https://example.com")), Some("https://example.com/x"));
        assert_eq!(entry.best_redirect(Some("ftp://unrelated")), Some("http://other/x"));
    }
}
