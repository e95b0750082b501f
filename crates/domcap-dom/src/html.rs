//! Minimal HTML fragment parsing and serialization.
//!
//! The protocol layer round-trips small HTML fragments: request bodies are
//! serialized subtrees, response bodies parse back into nodes. This module
//! implements the subset that round-trip requires — elements, attributes,
//! text with the five standard entities, comments (skipped), and void
//! elements. It is not a general-purpose HTML parser and is strict about
//! mismatched close tags.

use thiserror::Error;

use crate::tree::{Document, NodeId, NodeKind};

/// Elements serialized without a closing tag and parsed as childless.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Errors raised while parsing markup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// Input ended inside a tag or comment.
    #[error("unexpected end of input at byte {at}")]
    UnexpectedEof {
        /// Byte offset where parsing stopped.
        at: usize,
    },

    /// A tag could not be tokenized.
    #[error("malformed tag at byte {at}")]
    MalformedTag {
        /// Byte offset of the offending `<`.
        at: usize,
    },

    /// A close tag did not match the open element.
    #[error("mismatched close tag: expected </{expected}>, found </{found}>")]
    MismatchedClose {
        /// The element awaiting closure.
        expected: String,
        /// The close tag encountered.
        found: String,
    },

    /// The markup did not resolve to exactly one top-level node.
    #[error("markup must represent a single node; got {count}")]
    NotSingleRoot {
        /// Number of top-level nodes found after trimming.
        count: usize,
    },
}

/// Parses a fragment into detached nodes allocated in `doc`.
///
/// # Errors
///
/// Returns a [`MarkupError`] for truncated input, malformed tags, or
/// mismatched close tags.
pub fn parse_fragment(doc: &mut Document, input: &str) -> Result<Vec<NodeId>, MarkupError> {
    Parser {
        doc,
        input,
        pos: 0,
    }
    .parse_nodes(None)
}

/// Parses markup that must represent exactly one node.
///
/// The input is trimmed first, so whitespace around a single element does
/// not count as neighbouring text nodes.
///
/// # Errors
///
/// Returns [`MarkupError::NotSingleRoot`] when trimming and parsing yields
/// zero or more than one top-level node, or any parse error from
/// [`parse_fragment`].
pub fn parse_single(doc: &mut Document, input: &str) -> Result<NodeId, MarkupError> {
    let nodes = parse_fragment(doc, input.trim())?;
    match nodes.as_slice() {
        [single] => Ok(*single),
        other => Err(MarkupError::NotSingleRoot { count: other.len() }),
    }
}

/// Serializes the subtree rooted at `node` (outer markup).
#[must_use]
pub fn serialize(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out);
    out
}

/// Serializes the children of `node` (inner markup).
#[must_use]
pub fn serialize_children(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(node) {
        write_node(doc, *child, &mut out);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    match doc.kind(node) {
        NodeKind::Text(text) => out.push_str(&escape_text(text)),
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in doc.children(node) {
                write_node(doc, *child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let mut matched = false;
        for (entity, ch) in [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ] {
            if let Some(after) = rest.strip_prefix(entity) {
                out.push(ch);
                rest = after;
                matched = true;
                break;
            }
        }
        if !matched {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

struct Parser<'d, 'i> {
    doc: &'d mut Document,
    input: &'i str,
    pos: usize,
}

impl Parser<'_, '_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn parse_nodes(&mut self, open_tag: Option<&str>) -> Result<Vec<NodeId>, MarkupError> {
        let mut nodes = Vec::new();
        loop {
            if self.rest().is_empty() {
                if let Some(expected) = open_tag {
                    return Err(MarkupError::MismatchedClose {
                        expected: expected.to_string(),
                        found: "(end of input)".to_string(),
                    });
                }
                return Ok(nodes);
            }
            if self.rest().starts_with("<!--") {
                self.skip_comment()?;
                continue;
            }
            if self.rest().starts_with("</") {
                let at = self.pos;
                let found = self.read_close_tag()?;
                return match open_tag {
                    Some(expected) if expected == found => Ok(nodes),
                    Some(expected) => Err(MarkupError::MismatchedClose {
                        expected: expected.to_string(),
                        found,
                    }),
                    None => Err(MarkupError::MalformedTag { at }),
                };
            }
            if self.rest().starts_with('<') {
                nodes.push(self.parse_element()?);
                continue;
            }
            nodes.push(self.parse_text());
        }
    }

    fn parse_text(&mut self) -> NodeId {
        let end = self.rest().find('<').unwrap_or(self.rest().len());
        let raw = self.rest()[..end].to_string();
        self.pos += end;
        self.doc.create_text(&unescape(&raw))
    }

    fn skip_comment(&mut self) -> Result<(), MarkupError> {
        match self.rest().find("-->") {
            Some(end) => {
                self.pos += end + 3;
                Ok(())
            }
            None => Err(MarkupError::UnexpectedEof { at: self.pos }),
        }
    }

    fn read_close_tag(&mut self) -> Result<String, MarkupError> {
        let at = self.pos;
        self.pos += 2; // "</"
        let Some(end) = self.rest().find('>') else {
            return Err(MarkupError::UnexpectedEof { at });
        };
        let name = self.rest()[..end].trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(MarkupError::MalformedTag { at });
        }
        self.pos += end + 1;
        Ok(name)
    }

    fn parse_element(&mut self) -> Result<NodeId, MarkupError> {
        let at = self.pos;
        self.pos += 1; // "<"
        let name = self.read_name();
        if name.is_empty() {
            return Err(MarkupError::MalformedTag { at });
        }
        let element = self.doc.create_element(&name);
        let tag = name.to_ascii_lowercase();

        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.rest().chars().next() {
                None => return Err(MarkupError::UnexpectedEof { at }),
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('/') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    if self.rest().starts_with('>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                    return Err(MarkupError::MalformedTag { at });
                }
                Some(_) => {
                    let (attr_name, attr_value) = self.read_attribute(at)?;
                    self.doc.set_attr(element, &attr_name, &attr_value);
                }
            }
        }

        if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
            let children = self.parse_nodes(Some(&tag))?;
            for child in children {
                // Children were just created detached in this document, so
                // the append cannot fail.
                self.doc
                    .append_child(element, child)
                    .map_err(|_| MarkupError::MalformedTag { at })?;
            }
        }
        Ok(element)
    }

    fn read_name(&mut self) -> String {
        let end = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(self.rest().len());
        let name = self.rest()[..end].to_string();
        self.pos += end;
        name
    }

    fn read_attribute(&mut self, at: usize) -> Result<(String, String), MarkupError> {
        let name = self.read_name();
        if name.is_empty() {
            return Err(MarkupError::MalformedTag { at });
        }
        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return Ok((name, String::new()));
        }
        self.pos += 1;
        self.skip_whitespace();
        let value = match self.rest().chars().next() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let Some(end) = self.rest().find(quote) else {
                    return Err(MarkupError::UnexpectedEof { at });
                };
                let raw = self.rest()[..end].to_string();
                self.pos += end + 1;
                unescape(&raw)
            }
            _ => {
                let end = self
                    .rest()
                    .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
                    .unwrap_or(self.rest().len());
                let raw = self.rest()[..end].to_string();
                self.pos += end;
                unescape(&raw)
            }
        };
        Ok((name, value))
    }

    fn skip_whitespace(&mut self) {
        let end = self
            .rest()
            .find(|c: char| !c.is_ascii_whitespace())
            .unwrap_or(self.rest().len());
        self.pos += end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &str) -> String {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, input).unwrap();
        serialize(&doc, node)
    }

    #[test]
    fn parses_a_simple_element() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, r#"<li id="a" class="done">text</li>"#).unwrap();
        assert_eq!(doc.tag(node), Some("li"));
        assert_eq!(doc.attr(node, "id"), Some("a"));
        assert_eq!(doc.attr(node, "class"), Some("done"));
        assert_eq!(doc.text_content(node), "text");
    }

    #[test]
    fn serialization_round_trips() {
        let input = r#"<ul id="list"><li>one</li><li class="done">two</li></ul>"#;
        assert_eq!(roundtrip(input), input);
    }

    #[test]
    fn trims_whitespace_around_single_node() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "  <img src=\"x.png\">  ").unwrap();
        assert_eq!(doc.tag(node), Some("img"));
    }

    #[test]
    fn rejects_zero_and_multiple_roots() {
        let mut doc = Document::new();
        assert_eq!(
            parse_single(&mut doc, "   "),
            Err(MarkupError::NotSingleRoot { count: 0 })
        );
        assert_eq!(
            parse_single(&mut doc, "<li>a</li><li>b</li>"),
            Err(MarkupError::NotSingleRoot { count: 2 })
        );
    }

    #[test]
    fn unquoted_attribute_values_parse() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "<input type=text value=7>").unwrap();
        assert_eq!(doc.attr(node, "type"), Some("text"));
        assert_eq!(doc.attr(node, "value"), Some("7"));
    }

    #[test]
    fn bare_text_parses_as_a_text_node() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "plain words").unwrap();
        assert_eq!(doc.text(node), Some("plain words"));
    }

    #[test]
    fn entities_unescape_and_reescape() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "<p>a &amp; b &lt;c&gt;</p>").unwrap();
        assert_eq!(doc.text_content(node), "a & b <c>");
        assert_eq!(serialize(&doc, node), "<p>a &amp; b &lt;c&gt;</p>");
    }

    #[test]
    fn void_elements_have_no_children() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "<div><br><span>x</span></div>").unwrap();
        let children = doc.element_children(node);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.tag(children[0]), Some("br"));
        assert!(doc.children(children[0]).is_empty());
    }

    #[test]
    fn comments_are_skipped() {
        let mut doc = Document::new();
        let node = parse_single(&mut doc, "<p><!-- note -->kept</p>").unwrap();
        assert_eq!(doc.text_content(node), "kept");
    }

    #[test]
    fn mismatched_close_tag_is_an_error() {
        let mut doc = Document::new();
        assert!(matches!(
            parse_single(&mut doc, "<div><span></div>"),
            Err(MarkupError::MismatchedClose { .. })
        ));
    }

    #[test]
    fn valueless_attributes_round_trip() {
        assert_eq!(roundtrip("<div inert>x</div>"), "<div inert>x</div>");
    }

    #[test]
    fn attribute_values_escape_quotes() {
        let mut doc = Document::new();
        let node = doc.create_element("div");
        doc.set_attr(node, "title", "say \"hi\"");
        assert_eq!(
            serialize(&doc, node),
            "<div title=\"say &quot;hi&quot;\"></div>"
        );
    }
}
