//! Keyset-paginated query iterator with sort-invariant enforcement.
//!
//! Wraps a store query that is sorted ascending by the first value of a
//! multivalued property. Each page is fetched strictly after the
//! `(first_value, path)` cursor of the previous page's last row, so a
//! value shared by many resources is never split across a page boundary
//! from the iterator's point of view — whether the underlying store
//! chooses to return more than `page_size` rows to keep a value-group
//! whole is up to the `PagedQuerySource` implementation.

use crate::resource::Resource;
use crate::{MapError, Result};
use std::collections::VecDeque;

/// Source of sorted pages, implemented by a store adapter. `after` is
/// `None` for the first page, then the `(first_value, path)` of the last
/// row returned so far.
pub trait PagedQuerySource {
    fn fetch_page(&self, after: Option<(&str, &str)>, page_size: usize) -> Result<Vec<Resource>>;
}

pub struct PagedQueryIterator<'a> {
    source: &'a dyn PagedQuerySource,
    property: String,
    page_size: usize,
    cursor: Option<(String, String)>,
    buffer: VecDeque<Resource>,
    done: bool,
    last_seen_key: Option<String>,
    group_key: Option<String>,
    group_count: usize,
    /// Largest number of rows observed sharing a single property value.
    pub largest_key_count: usize,
}

impl<'a> PagedQueryIterator<'a> {
    pub fn new(source: &'a dyn PagedQuerySource, property: impl Into<String>, page_size: usize) -> Self {
        Self {
            source,
            property: property.into(),
            page_size: page_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
            last_seen_key: None,
            group_key: None,
            group_count: 0,
            largest_key_count: 0,
        }
    }

    fn key_of(&self, r: &Resource) -> String {
        r.string_values(&self.property).into_iter().next().unwrap_or_default()
    }

    fn fill(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        let after = self.cursor.as_ref().map(|(k, p)| (k.as_str(), p.as_str()));
        let page = self.source.fetch_page(after, self.page_size)?;
        if page.is_empty() {
            self.done = true;
            return Ok(());
        }

        for r in &page {
            let key = self.key_of(r);
            if let Some(prev) = &self.last_seen_key {
                if &key < prev {
                    return Err(MapError::InternalInvariantViolation(format!(
                        "paged query returned out-of-order row: {key} < {prev} at {}",
                        r.path
                    )));
                }
            }
            if self.group_key.as_deref() == Some(key.as_str()) {
                self.group_count += 1;
            } else {
                self.group_key = Some(key.clone());
                self.group_count = 1;
            }
            self.largest_key_count = self.largest_key_count.max(self.group_count);
            self.last_seen_key = Some(key);
        }

        if page.len() > 10 * self.page_size {
            tracing::warn!(
                rows = page.len(),
                page_size = self.page_size,
                "paged query page far exceeds page size; a value-group may be unusually large"
            );
        }

        let last = page.last().unwrap();
        self.cursor = Some((self.key_of(last), last.path.clone()));
        if page.len() < self.page_size {
            self.done = true;
        }
        self.buffer.extend(page);
        Ok(())
    }

    /// Drain the iterator into a single `Vec`, surfacing the first
    /// invariant violation as an error. Callers that see an error here
    /// should downgrade to an unpaged scan per the error-handling design.
    pub fn collect_all(mut self) -> Result<Vec<Resource>> {
        let mut out = Vec::new();
        loop {
            match self.next() {
                Some(Ok(r)) => out.push(r),
                Some(Err(e)) => return Err(e),
                None => return Ok(out),
            }
        }
    }
}

impl<'a> Iterator for PagedQueryIterator<'a> {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeSource {
        rows: Vec<Resource>,
    }

    impl PagedQuerySource for FakeSource {
        fn fetch_page(&self, after: Option<(&str, &str)>, page_size: usize) -> Result<Vec<Resource>> {
            let start = match after {
                None => 0,
                Some((key, path)) => self
                    .rows
                    .iter()
                    .position(|r| {
                        let k = r.string_values("sling:vanityPath").into_iter().next().unwrap_or_default();
                        (k.as_str(), r.path.as_str()) > (key, path)
                    })
                    .unwrap_or(self.rows.len()),
            };
            Ok(self.rows[start..].iter().take(page_size).cloned().collect())
        }
    }

    fn row(path: &str, key: &str) -> Resource {
        Resource::new(path, "nt:unstructured").with_property("sling:vanityPath", json!([key]))
    }

    #[test]
    fn pages_through_all_rows_in_order() {
        let rows = vec![row("/a", "a"), row("/b", "b"), row("/c", "c"), row("/d", "d"), row("/e", "e")];
        let source = FakeSource { rows };
        let iter = PagedQueryIterator::new(&source, "sling:vanityPath", 2);
        let out = iter.collect_all().unwrap();
        assert_eq!(out.iter().map(|r| r.path.clone()).collect::<Vec<_>>(), vec!["/a", "/b", "/c", "/d", "/e"]);
    }

    #[test]
    fn tracks_largest_group_size() {
        let rows = vec![row("/a", "x"), row("/b", "x"), row("/c", "x"), row("/d", "y")];
        let source = FakeSource { rows };
        let mut iter = PagedQueryIterator::new(&source, "sling:vanityPath", 2);
        let collected: Vec<_> = iter.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(collected.len(), 4);
        assert_eq!(iter.largest_key_count, 3);
    }

    struct OutOfOrderSource;
    impl PagedQuerySource for OutOfOrderSource {
        fn fetch_page(&self, after: Option<(&str, &str)>, _page_size: usize) -> Result<Vec<Resource>> {
            if after.is_none() {
                Ok(vec![row("/a", "b"), row("/b", "a")])
            } else {
                Ok(vec![])
            }
        }
    }

    #[test]
    fn out_of_order_row_is_a_hard_error() {
        let source = OutOfOrderSource;
        let iter = PagedQueryIterator::new(&source, "sling:vanityPath", 10);
        let err = iter.collect_all().unwrap_err();
        assert!(matches!(err, MapError::InternalInvariantViolation(_)));
    }
}
