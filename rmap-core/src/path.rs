//! Path helpers shared across the mount tree, alias index, and mapper.

/// Name reserved for the child that carries a resource's structured content.
/// An alias or vanity-path property declared on a `jcr:content` child
/// applies to its *parent*, not to the `jcr:content` node itself.
pub const JCR_CONTENT: &str = "jcr:content";

/// Split an absolute path into its `/`-separated segments, skipping the
/// empty leading segment produced by the root slash. `"/"` yields no
/// segments; `"/a/b"` yields `["a", "b"]`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

pub fn name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// If `path` names a `jcr:content` node, returns the path of the resource
/// that owns it (its parent); otherwise returns `path` unchanged.
pub fn owning_resource(path: &str) -> String {
    if name(path) == JCR_CONTENT {
        parent(path).unwrap_or_else(|| path.to_string())
    } else {
        path.to_string()
    }
}

pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// `true` if `ancestor` is `descendant` or a path-prefix ancestor of it.
pub fn is_ancestor_or_self(ancestor: &str, descendant: &str) -> bool {
    if ancestor == descendant {
        return true;
    }
    if ancestor == "/" {
        return true;
    }
    descendant.starts_with(ancestor) && descendant.as_bytes().get(ancestor.len()) == Some(&b'/')
}

/// Strip a leading `.` selector/extension chain from the last segment of a
/// request path, returning `(stem, suffix)`. Used by the resolve-map
/// iterator to retry shorter keys by trimming `.html`, `.json`, selectors,
/// and so on before walking up a path segment.
pub fn split_selectors(key: &str) -> (&str, &str) {
    let last_slash = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    let tail = &key[last_slash..];
    match tail.find('.') {
        Some(dot) => (&key[..last_slash + dot], &key[last_slash + dot..]),
        None => (key, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_splits_on_slash() {
        assert_eq!(segments("/a/b/c"), vec!["a", "b", "c"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn parent_of_root_is_none() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/".to_string()));
        assert_eq!(parent("/a/b"), Some("/a".to_string()));
    }

    #[test]
    fn owning_resource_skips_jcr_content() {
        assert_eq!(owning_resource("/content/foo/jcr:content"), "/content/foo");
        assert_eq!(owning_resource("/content/foo"), "/content/foo");
    }

    #[test]
    fn is_ancestor_or_self_requires_segment_boundary() {
        assert!(is_ancestor_or_self("/content", "/content/foo"));
        assert!(!is_ancestor_or_self("/content", "/contentfoo"));
        assert!(is_ancestor_or_self("/content/foo", "/content/foo"));
    }

    #[test]
    fn split_selectors_trims_dot_chain() {
        assert_eq!(split_selectors("/a/b.html"), ("/a/b", ".html"));
        assert_eq!(split_selectors("/a/b.print.html"), ("/a/b", ".print.html"));
        assert_eq!(split_selectors("/a/b"), ("/a/b", ""));
    }
}
