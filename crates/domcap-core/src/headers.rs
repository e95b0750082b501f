//! Ordered, case-insensitive header sets.
//!
//! Both request headers and the per-part header sets produced by multipart
//! parsing use this map: insertion order is preserved, lookups ignore case,
//! and duplicate names resolve last-write-wins.

/// An ordered header map with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value for `name`, matching case-insensitively. With duplicate
    /// names the last write wins.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` when `name` is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`, replacing any existing occurrences.
    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Appends an occurrence without removing existing ones.
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `boundary` parameter of the `Content-Type` header, if any.
    ///
    /// A surrounding quote pair is stripped; everything after `boundary=`
    /// otherwise passes through verbatim.
    #[must_use]
    pub fn content_type_boundary(&self) -> Option<&str> {
        let content_type = self.get("content-type")?;
        let raw = content_type.split_once("boundary=")?.1.trim();
        Some(
            raw.strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .unwrap_or(raw),
        )
    }

    /// The selector carried by a `Content-Range: selector=<S>` header.
    #[must_use]
    pub fn content_range_selector(&self) -> Option<&str> {
        let value = self.get("content-range")?;
        let selector = value.trim().strip_prefix("selector=")?.trim();
        (!selector.is_empty()).then_some(selector)
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert!(headers.has("Content-type"));
    }

    #[test]
    fn duplicate_names_resolve_last_write_wins() {
        let mut headers = HeaderMap::new();
        headers.append("Allow", "GET");
        headers.append("allow", "GET,PUT");
        assert_eq!(headers.get("Allow"), Some("GET,PUT"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn set_replaces_all_occurrences() {
        let mut headers = HeaderMap::new();
        headers.append("Range", "a");
        headers.append("Range", "b");
        headers.set("range", "c");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Range"), Some("c"));
    }

    #[test]
    fn boundary_parameter_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "multipart/mixed; boundary=chunk-7");
        assert_eq!(headers.content_type_boundary(), Some("chunk-7"));

        headers.set("Content-Type", "multipart/mixed; boundary=\"quoted\"");
        assert_eq!(headers.content_type_boundary(), Some("quoted"));

        headers.set("Content-Type", "text/html");
        assert_eq!(headers.content_type_boundary(), None);
    }

    #[test]
    fn content_range_selector_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Range", "selector=#tasks > li:nth-child(2)");
        assert_eq!(
            headers.content_range_selector(),
            Some("#tasks > li:nth-child(2)")
        );

        headers.set("Content-Range", "bytes 0-99/100");
        assert_eq!(headers.content_range_selector(), None);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut headers = HeaderMap::new();
        headers.set("b", "2");
        headers.set("a", "1");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
