//! CSS selector subset: parsing, matching, and stable selector derivation.
//!
//! Two directions meet here. [`resolve`] derives the shortest sufficient
//! selector for an element — the addressing key embedded in every request
//! and discovery response. [`Selector::parse`] plus [`matches`] /
//! [`query_all`] consume selectors coming back from discovery.
//!
//! A derived selector is a point-in-time snapshot, not a persistent
//! identity: it resolves back to exactly the source element at derivation
//! time, and goes stale the moment the element moves. Callers treating it
//! as a durable key will observe server-side misses, which is the expected
//! failure mode.
//!
//! Supported grammar: `*`, `tag`, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, `:nth-child(n)`, compounds thereof, and the child
//! (`>`) and descendant (whitespace) combinators.

use thiserror::Error;

use crate::tree::{Document, NodeId};

/// Errors raised while parsing a selector string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector was empty or all whitespace.
    #[error("empty selector")]
    Empty,

    /// A pseudo-class other than `nth-child` was used.
    #[error("unsupported pseudo-class :{name}")]
    UnsupportedPseudo {
        /// The pseudo-class name.
        name: String,
    },

    /// A character could not start a simple selector.
    #[error("unexpected character {ch:?} at byte {at}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Its byte offset.
        at: usize,
    },

    /// An attribute test was not terminated or malformed.
    #[error("malformed attribute selector at byte {at}")]
    MalformedAttribute {
        /// Byte offset of the opening `[`.
        at: usize,
    },

    /// `:nth-child` did not contain a positive integer.
    #[error("malformed :nth-child argument")]
    MalformedNthChild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    /// First compound of the selector.
    None,
    /// `>`
    Child,
    /// Whitespace.
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    universal: bool,
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    nth_child: Option<usize>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_child.is_none()
    }
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Compounds left to right; each carries the combinator linking it to
    /// the compound before it.
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parses a selector string.
    ///
    /// # Errors
    ///
    /// Returns a [`SelectorError`] for empty input, unsupported syntax, or
    /// malformed simple selectors.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = SelectorParser {
            input,
            pos: 0,
        };
        parser.parse()
    }
}

struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl SelectorParser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) -> bool {
        let end = self
            .rest()
            .find(|c: char| !c.is_ascii_whitespace())
            .unwrap_or(self.rest().len());
        self.pos += end;
        end > 0
    }

    fn parse(&mut self) -> Result<Selector, SelectorError> {
        self.skip_whitespace();
        if self.rest().is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut parts = Vec::new();
        let first = self.parse_compound()?;
        parts.push((Combinator::None, first));
        loop {
            let had_space = self.skip_whitespace();
            if self.rest().is_empty() {
                break;
            }
            let combinator = if self.peek() == Some('>') {
                self.pos += 1;
                self.skip_whitespace();
                Combinator::Child
            } else if had_space {
                Combinator::Descendant
            } else {
                return Err(SelectorError::UnexpectedChar {
                    ch: self.peek().unwrap_or(' '),
                    at: self.pos,
                });
            };
            let compound = self.parse_compound()?;
            parts.push((combinator, compound));
        }
        Ok(Selector { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    compound.universal = true;
                }
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.read_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.read_ident()?);
                }
                Some('[') => {
                    compound.attrs.push(self.read_attr_test()?);
                }
                Some(':') => {
                    self.pos += 1;
                    let name = self.read_ident()?;
                    if name != "nth-child" {
                        return Err(SelectorError::UnsupportedPseudo { name });
                    }
                    compound.nth_child = Some(self.read_nth_argument()?);
                }
                Some(ch) if compound.is_empty() && is_ident_start(ch) => {
                    compound.tag = Some(self.read_ident()?.to_ascii_lowercase());
                }
                _ => break,
            }
        }
        if compound.is_empty() {
            return Err(SelectorError::UnexpectedChar {
                ch: self.peek().unwrap_or(' '),
                at: self.pos,
            });
        }
        Ok(compound)
    }

    fn read_ident(&mut self) -> Result<String, SelectorError> {
        let mut out = String::new();
        let mut chars = self.rest().char_indices().peekable();
        let mut consumed = 0;
        while let Some(&(idx, ch)) = chars.peek() {
            if ch == '\\' {
                chars.next();
                let (value, len) = read_escape(&self.rest()[idx..]);
                out.push(value);
                // Skip over the escape body.
                consumed = idx + len;
                while chars.peek().is_some_and(|&(i, _)| i < consumed) {
                    chars.next();
                }
                continue;
            }
            if is_ident_char(ch) {
                out.push(ch);
                chars.next();
                consumed = idx + ch.len_utf8();
                continue;
            }
            break;
        }
        self.pos += consumed;
        if out.is_empty() {
            return Err(SelectorError::UnexpectedChar {
                ch: self.peek().unwrap_or(' '),
                at: self.pos,
            });
        }
        Ok(out)
    }

    fn read_attr_test(&mut self) -> Result<AttrTest, SelectorError> {
        let at = self.pos;
        self.pos += 1; // "["
        self.skip_whitespace();
        let name = self
            .read_ident()
            .map_err(|_| SelectorError::MalformedAttribute { at })?
            .to_ascii_lowercase();
        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(AttrTest { name, value: None })
            }
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        let Some(end) = self.rest().find(quote) else {
                            return Err(SelectorError::MalformedAttribute { at });
                        };
                        let value = self.rest()[..end].to_string();
                        self.pos += end + 1;
                        value
                    }
                    _ => self
                        .read_ident()
                        .map_err(|_| SelectorError::MalformedAttribute { at })?,
                };
                self.skip_whitespace();
                if self.peek() != Some(']') {
                    return Err(SelectorError::MalformedAttribute { at });
                }
                self.pos += 1;
                Ok(AttrTest {
                    name,
                    value: Some(value),
                })
            }
            _ => Err(SelectorError::MalformedAttribute { at }),
        }
    }

    fn read_nth_argument(&mut self) -> Result<usize, SelectorError> {
        if self.peek() != Some('(') {
            return Err(SelectorError::MalformedNthChild);
        }
        self.pos += 1;
        let Some(end) = self.rest().find(')') else {
            return Err(SelectorError::MalformedNthChild);
        };
        let digits = self.rest()[..end].trim();
        let n: usize = digits
            .parse()
            .map_err(|_| SelectorError::MalformedNthChild)?;
        if n == 0 {
            return Err(SelectorError::MalformedNthChild);
        }
        self.pos += end + 1;
        Ok(n)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}

/// Reads a backslash escape starting at `input` (which begins with `\`).
/// Returns the decoded char and the byte length consumed, including the
/// backslash and an optional trailing space after a hex escape.
fn read_escape(input: &str) -> (char, usize) {
    let body = &input[1..];
    let hex_len = body
        .char_indices()
        .take(6)
        .take_while(|(_, c)| c.is_ascii_hexdigit())
        .count();
    if hex_len > 0 {
        let digits = &body[..hex_len];
        if let Some(value) = u32::from_str_radix(digits, 16).ok().and_then(char::from_u32) {
            let mut len = 1 + hex_len;
            if body[hex_len..].starts_with(' ') {
                len += 1;
            }
            return (value, len);
        }
    }
    match body.chars().next() {
        Some(ch) => (ch, 1 + ch.len_utf8()),
        None => ('\\', 1),
    }
}

/// Escapes a string for use as a CSS identifier (after `#`).
///
/// Keeps ASCII alphanumerics, `-`, `_`, and non-ASCII characters; hex
/// escapes a leading digit; backslash-escapes everything else.
#[must_use]
pub fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, ch) in ident.chars().enumerate() {
        let keep = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii();
        if i == 0 && ch.is_ascii_digit() {
            out.push_str(&format!("\\{:x} ", ch as u32));
        } else if keep {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

fn compound_matches(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    if !doc.is_element(node) {
        return false;
    }
    if let Some(tag) = &compound.tag {
        if doc.tag(node) != Some(tag.as_str()) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if doc.element_id(node) != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let class_attr = doc.attr(node, "class").unwrap_or("");
        let classes: Vec<&str> = class_attr.split_ascii_whitespace().collect();
        if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }
    for test in &compound.attrs {
        match (&test.value, doc.attr(node, &test.name)) {
            (None, Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    if let Some(n) = compound.nth_child {
        if doc.element_position(node) != Some(n) {
            return false;
        }
    }
    true
}

fn matches_at(doc: &Document, node: NodeId, parts: &[(Combinator, Compound)], idx: usize) -> bool {
    if !compound_matches(doc, node, &parts[idx].1) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match parts[idx].0 {
        Combinator::Child => doc
            .parent(node)
            .is_some_and(|p| matches_at(doc, p, parts, idx - 1)),
        Combinator::Descendant => doc
            .ancestors(node)
            .iter()
            .any(|&a| matches_at(doc, a, parts, idx - 1)),
        Combinator::None => false,
    }
}

/// `true` when `node` matches `selector`.
#[must_use]
pub fn matches(doc: &Document, node: NodeId, selector: &Selector) -> bool {
    matches_at(doc, node, &selector.parts, selector.parts.len() - 1)
}

/// All elements under (and including) `root` matching `selector`, in
/// document order.
#[must_use]
pub fn query_all(doc: &Document, root: NodeId, selector: &Selector) -> Vec<NodeId> {
    doc.descendant_elements(root)
        .into_iter()
        .filter(|&n| matches(doc, n, selector))
        .collect()
}

/// The first element matching `selector`, in document order.
#[must_use]
pub fn query_first(doc: &Document, root: NodeId, selector: &Selector) -> Option<NodeId> {
    doc.descendant_elements(root)
        .into_iter()
        .find(|&n| matches(doc, n, selector))
}

/// Derives the shortest sufficient selector addressing `node` right now.
///
/// An element with an `id` resolves to `#<escaped id>` immediately.
/// Otherwise the walk appends one `tag:nth-child(position)` segment per
/// ancestor level and stops early at the first ancestor carrying an `id`.
/// The output is lower-cased. Resolution failure (a detached or non-element
/// node) degrades to the bare tag name — a best-effort identity, not a
/// unique match.
#[must_use]
pub fn resolve(doc: &Document, node: NodeId) -> String {
    match resolve_unique(doc, node) {
        Some(selector) => selector,
        None => doc.tag(node).unwrap_or("unknown").to_string(),
    }
}

fn resolve_unique(doc: &Document, node: NodeId) -> Option<String> {
    if !doc.is_element(node) {
        return None;
    }
    if let Some(id) = doc.element_id(node).filter(|id| !id.is_empty()) {
        return Some(format!("#{}", css_escape(id)));
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = node;
    loop {
        let position = doc.element_position(current)?;
        let tag = doc.tag(current)?;
        match doc.parent(current) {
            Some(parent) => {
                if let Some(parent_id) = doc.element_id(parent).filter(|id| !id.is_empty()) {
                    segments.insert(
                        0,
                        format!("#{} > {tag}:nth-child({position})", css_escape(parent_id)),
                    );
                    return Some(segments.join(" > ").to_lowercase());
                }
                segments.insert(0, format!("{tag}:nth-child({position})"));
                current = parent;
            }
            None => {
                // The root's parent is the document itself.
                segments.insert(0, format!("{tag}:nth-child({position})"));
                return Some(segments.join(" > ").to_lowercase());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_strs(doc: &Document, selector: &str) -> Vec<NodeId> {
        let parsed = Selector::parse(selector).unwrap();
        query_all(doc, doc.root(), &parsed)
    }

    #[test]
    fn id_fast_path_returns_escaped_id() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attr(el, "id", "item:1");
        doc.append_child(doc.body(), el).unwrap();
        assert_eq!(resolve(&doc, el), "#item\\:1");
    }

    #[test]
    fn resolution_walks_to_identified_ancestor() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        doc.set_attr(list, "id", "tasks");
        let li_one = doc.create_element("li");
        let li_two = doc.create_element("li");
        let span = doc.create_element("span");
        doc.append_child(doc.body(), list).unwrap();
        doc.append_child(list, li_one).unwrap();
        doc.append_child(list, li_two).unwrap();
        doc.append_child(li_two, span).unwrap();

        assert_eq!(resolve(&doc, li_two), "#tasks > li:nth-child(2)");
        assert_eq!(
            resolve(&doc, span),
            "#tasks > li:nth-child(2) > span:nth-child(1)"
        );
    }

    #[test]
    fn resolution_reaches_document_root_without_ids() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append_child(doc.body(), p).unwrap();
        assert_eq!(
            resolve(&doc, p),
            "html:nth-child(1) > body:nth-child(2) > p:nth-child(1)"
        );
    }

    #[test]
    fn resolved_selector_matches_exactly_the_source_element() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        doc.set_attr(list, "id", "tasks");
        doc.append_child(doc.body(), list).unwrap();
        let mut items = Vec::new();
        for _ in 0..3 {
            let li = doc.create_element("li");
            doc.append_child(list, li).unwrap();
            items.push(li);
        }
        for &li in &items {
            let selector = Selector::parse(&resolve(&doc, li)).unwrap();
            assert_eq!(query_all(&doc, doc.root(), &selector), vec![li]);
        }
    }

    #[test]
    fn detached_node_degrades_to_tag_name() {
        let mut doc = Document::new();
        let orphan_parent = doc.create_element("div");
        let orphan = doc.create_element("em");
        doc.append_child(orphan_parent, orphan).unwrap();
        assert_eq!(resolve(&doc, orphan), "em");

        let text = doc.create_text("x");
        assert_eq!(resolve(&doc, text), "unknown");
    }

    #[test]
    fn matches_tag_id_class_and_attr() {
        let mut doc = Document::new();
        let el = doc.create_element("li");
        doc.set_attr(el, "id", "a");
        doc.set_attr(el, "class", "done urgent");
        doc.set_attr(el, "itemprop", "name");
        doc.append_child(doc.body(), el).unwrap();

        for selector in [
            "li",
            "#a",
            ".done",
            "li.done.urgent",
            "[itemprop]",
            "[itemprop=\"name\"]",
            "li#a[itemprop=name]",
            "*",
        ] {
            let parsed = Selector::parse(selector).unwrap();
            assert!(matches(&doc, el, &parsed), "selector {selector} must match");
        }
        for selector in ["ul", "#b", ".open", "[itemprop=\"title\"]"] {
            let parsed = Selector::parse(selector).unwrap();
            assert!(!matches(&doc, el, &parsed), "selector {selector} must not match");
        }
    }

    #[test]
    fn combinators_distinguish_child_and_descendant() {
        let mut doc = Document::new();
        let section = doc.create_element("section");
        doc.set_attr(section, "id", "s");
        let wrapper = doc.create_element("div");
        let leaf = doc.create_element("span");
        doc.append_child(doc.body(), section).unwrap();
        doc.append_child(section, wrapper).unwrap();
        doc.append_child(wrapper, leaf).unwrap();

        let descendant = Selector::parse("#s span").unwrap();
        assert!(matches(&doc, leaf, &descendant));
        let child = Selector::parse("#s > span").unwrap();
        assert!(!matches(&doc, leaf, &child));
        let two_level = Selector::parse("#s > div > span").unwrap();
        assert!(matches(&doc, leaf, &two_level));
    }

    #[test]
    fn nth_child_counts_element_siblings() {
        let mut doc = Document::new();
        let ul = doc.create_element("ul");
        doc.append_child(doc.body(), ul).unwrap();
        let text = doc.create_text("ignored");
        doc.append_child(ul, text).unwrap();
        let first = doc.create_element("li");
        let second = doc.create_element("li");
        doc.append_child(ul, first).unwrap();
        doc.append_child(ul, second).unwrap();

        assert_eq!(query_strs(&doc, "li:nth-child(1)"), vec![first]);
        assert_eq!(query_strs(&doc, "li:nth-child(2)"), vec![second]);
    }

    #[test]
    fn query_all_is_document_order() {
        let mut doc = Document::new();
        let mut created = Vec::new();
        for _ in 0..3 {
            let p = doc.create_element("p");
            doc.append_child(doc.body(), p).unwrap();
            created.push(p);
        }
        assert_eq!(query_strs(&doc, "p"), created);
        assert_eq!(
            query_first(&doc, doc.root(), &Selector::parse("p").unwrap()),
            Some(created[0])
        );
    }

    #[test]
    fn unsupported_pseudo_class_is_rejected() {
        assert!(matches!(
            Selector::parse("li:first-child"),
            Err(SelectorError::UnsupportedPseudo { .. })
        ));
        assert_eq!(Selector::parse("  "), Err(SelectorError::Empty));
    }

    #[test]
    fn escaped_identifiers_round_trip_through_parse() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attr(el, "id", "a.b:c");
        doc.append_child(doc.body(), el).unwrap();

        let derived = resolve(&doc, el);
        assert_eq!(derived, "#a\\.b\\:c");
        let parsed = Selector::parse(&derived).unwrap();
        assert!(matches(&doc, el, &parsed));
    }

    #[test]
    fn leading_digit_ids_use_hex_escapes() {
        assert_eq!(css_escape("1st"), "\\31 st");
        let parsed = Selector::parse("#\\31 st").unwrap();
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attr(el, "id", "1st");
        doc.append_child(doc.body(), el).unwrap();
        assert!(matches(&doc, el, &parsed));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn css_escape_round_trips_as_an_id_selector(
                id in "[a-zA-Z][a-zA-Z0-9:._-]{0,12}",
            ) {
                let mut doc = Document::new();
                let el = doc.create_element("div");
                doc.set_attr(el, "id", &id);
                doc.append_child(doc.body(), el).unwrap();

                let selector = format!("#{}", css_escape(&id));
                let parsed = Selector::parse(&selector).unwrap();
                prop_assert!(matches(&doc, el, &parsed));
            }

            #[test]
            fn resolve_is_unique_among_siblings(count in 1usize..6) {
                let mut doc = Document::new();
                let mut items = Vec::new();
                for _ in 0..count {
                    let li = doc.create_element("li");
                    doc.append_child(doc.body(), li).unwrap();
                    items.push(li);
                }
                for &li in &items {
                    let parsed = Selector::parse(&resolve(&doc, li)).unwrap();
                    prop_assert_eq!(query_all(&doc, doc.root(), &parsed), vec![li]);
                }
            }
        }
    }
}
