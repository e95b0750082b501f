//! Multipart discovery-response parsing.
//!
//! Batched capability discovery answers one OPTIONS request with a
//! `multipart/mixed` body: one part per selector, each part carrying only
//! headers (`Content-Range: selector=<S>` and `Allow: <verbs>`). This
//! parser decomposes such a body into an ordered sequence of per-part
//! header sets. It performs no I/O and holds no state.

use crate::headers::HeaderMap;

/// A multipart response body paired with its boundary token.
#[derive(Debug, Clone, Copy)]
pub struct MultipartBody<'a> {
    body: &'a str,
    boundary: &'a str,
}

impl<'a> MultipartBody<'a> {
    /// Wraps a raw body and its boundary token.
    #[must_use]
    pub fn new(body: &'a str, boundary: &'a str) -> Self {
        Self { body, boundary }
    }

    /// Decomposes the body into one header set per part, preserving part
    /// order.
    ///
    /// Splitting is boundary-delimited; empty segments and the terminal
    /// `--<boundary>--` marker are discarded. Within a part, lines up to
    /// the first blank line are parsed as headers, split on the first
    /// `": "`; lines without that delimiter are skipped; duplicate names
    /// are last-write-wins.
    #[must_use]
    pub fn parts(&self) -> Vec<HeaderMap> {
        let delimiter = format!("--{}\r\n", self.boundary);
        let terminal = format!("--{}--", self.boundary);
        self.body
            .split(delimiter.as_str())
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && *segment != "--")
            .map(|segment| {
                segment
                    .strip_suffix(terminal.as_str())
                    .map_or(segment, str::trim_end)
            })
            .filter(|segment| !segment.is_empty())
            .map(parse_part)
            .collect()
    }
}

fn parse_part(segment: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in segment.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            // Blank line ends the header block; anything after is part
            // body, which discovery parts do not carry.
            break;
        }
        if let Some((name, value)) = line.split_once(": ") {
            headers.set(name.trim(), value.trim());
        }
    }
    headers
}
