//! Arena-backed document tree.
//!
//! [`Document`] owns every node; callers hold [`NodeId`] handles. Structural
//! mutation goes through the document so that it can maintain parent links,
//! bump the revision counter, and journal insertions for mutation watchers.
//!
//! The tree deliberately models only what the protocol layer needs: element
//! and text nodes, ordered attributes, subtree cloning, structural equality,
//! and an insertion journal. There is no notion of comments, namespaces, or
//! document types.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Handle to a node owned by a [`Document`].
///
/// Handles are never invalidated: a detached node keeps its id and can be
/// re-inserted later. A handle must only be used with the document that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a lower-cased tag name and ordered attributes.
    Element {
        /// Lower-cased tag name.
        tag: String,
        /// Attributes in insertion order. Names are lower-cased.
        attrs: Vec<(String, String)>,
    },
    /// A text node.
    Text(String),
}

#[derive(Debug)]
struct NodeSlot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Errors raised by structural tree mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The target of a child operation is not an element.
    #[error("{node} is not an element and cannot hold children")]
    NotAnElement {
        /// The offending node.
        node: NodeId,
    },

    /// Inserting the node would create a cycle.
    #[error("inserting {node} under one of its own descendants")]
    WouldCycle {
        /// The node being inserted.
        node: NodeId,
    },

    /// The node passed as the replacement anchor is not a child of the
    /// given parent.
    #[error("{node} is not a child of {parent}")]
    NotAChild {
        /// The expected child.
        node: NodeId,
        /// The parent it was looked up under.
        parent: NodeId,
    },
}

/// An arena-backed document tree.
///
/// A fresh document owns a root `html` element with `head` and `body`
/// children, mirroring the shape of a hosted page.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeSlot>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    base_urls: HashMap<NodeId, String>,
    inserted_log: Vec<NodeId>,
    revision: u64,
}

impl Document {
    /// Creates a document with an empty `html` / `head` / `body` skeleton.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            base_urls: HashMap::new(),
            inserted_log: Vec::new(),
            revision: 0,
        };
        doc.root = doc.alloc(NodeKind::Element {
            tag: "html".to_string(),
            attrs: Vec::new(),
        });
        doc.head = doc.alloc(NodeKind::Element {
            tag: "head".to_string(),
            attrs: Vec::new(),
        });
        doc.body = doc.alloc(NodeKind::Element {
            tag: "body".to_string(),
            attrs: Vec::new(),
        });
        doc.nodes[doc.head.0].parent = Some(doc.root);
        doc.nodes[doc.body.0].parent = Some(doc.root);
        let (head, body) = (doc.head, doc.body);
        doc.nodes[doc.root.0].children = vec![head, body];
        // The skeleton is not journaled; watchers only care about growth
        // after they attach.
        doc.inserted_log.clear();
        doc
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeSlot {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// The root `html` element.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `head` element.
    #[must_use]
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// The `body` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Monotonic structural revision. Bumped by every insertion, removal,
    /// and replacement; unchanged by attribute edits.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Creates a detached element. The tag name is lower-cased.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    /// The node's payload.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    /// `true` when the node is an element.
    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element { .. })
    }

    /// The element's tag name, or `None` for text nodes.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// The text of a text node, or `None` for elements.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    /// An attribute value. Attribute names are matched case-insensitively.
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// `true` when the attribute is present (regardless of value).
    #[must_use]
    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    /// Sets an attribute, replacing any existing value. No-op on text nodes.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            let name = name.to_ascii_lowercase();
            if let Some(slot) = attrs.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value.to_string();
            } else {
                attrs.push((name, value.to_string()));
            }
        }
    }

    /// Removes an attribute. Returns `true` when it was present.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> bool {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            let before = attrs.len();
            attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            return attrs.len() != before;
        }
        false
    }

    /// The element's `id` attribute.
    #[must_use]
    pub fn element_id(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "id")
    }

    /// The node's parent, or `None` when detached or at the root.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// The node's children in order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// The node's element children in order.
    #[must_use]
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// 1-based position of the node among its parent's element children.
    ///
    /// The root element counts as position 1 (its parent is the document
    /// itself). Text nodes and nodes detached mid-tree return `None`.
    #[must_use]
    pub fn element_position(&self, node: NodeId) -> Option<usize> {
        if !self.is_element(node) {
            return None;
        }
        match self.parent(node) {
            Some(parent) => self
                .element_children(parent)
                .iter()
                .position(|&c| c == node)
                .map(|i| i + 1),
            None if node == self.root => Some(1),
            None => None,
        }
    }

    /// Ancestors of the node, nearest first, ending at the root.
    #[must_use]
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// `true` when the node's ancestor chain reaches the root.
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        if node == self.root {
            return true;
        }
        self.ancestors(node).last() == Some(&self.root)
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        self.ancestors(of).contains(&candidate)
    }

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NotAnElement`] when `parent` is a text node and
    /// [`DomError::WouldCycle`] when `child` is an ancestor of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if !self.is_element(parent) {
            return Err(DomError::NotAnElement { node: parent });
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(DomError::WouldCycle { node: child });
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.revision += 1;
        if self.is_connected(child) {
            self.journal_subtree(child);
        }
        Ok(())
    }

    /// Replaces `old` (a child of `parent`) with `new` in place.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NotAChild`] when `old` is not a child of
    /// `parent`, and the same errors as [`Document::append_child`] for an
    /// invalid parent or a cycle.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new: NodeId,
        old: NodeId,
    ) -> Result<(), DomError> {
        if !self.is_element(parent) {
            return Err(DomError::NotAnElement { node: parent });
        }
        if new == parent || self.is_ancestor(new, parent) {
            return Err(DomError::WouldCycle { node: new });
        }
        let Some(index) = self.nodes[parent.0].children.iter().position(|&c| c == old) else {
            return Err(DomError::NotAChild { node: old, parent });
        };
        self.detach(new);
        self.nodes[old.0].parent = None;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[parent.0].children[index] = new;
        self.revision += 1;
        if self.is_connected(new) {
            self.journal_subtree(new);
        }
        Ok(())
    }

    /// Detaches the node from its parent. The node and its subtree stay
    /// alive and can be re-inserted. No-op for already detached nodes.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
            self.revision += 1;
        }
    }

    fn journal_subtree(&mut self, node: NodeId) {
        if self.is_element(node) {
            self.inserted_log.push(node);
        }
        for child in self.nodes[node.0].children.clone() {
            self.journal_subtree(child);
        }
    }

    /// Drains the insertion journal: every element connected to the tree
    /// since the last drain, in insertion order.
    pub fn drain_inserted(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.inserted_log)
    }

    /// Deep-clones the subtree rooted at `node`. The clone is detached.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let kind = self.nodes[node.0].kind.clone();
        let clone = self.alloc(kind);
        for child in self.nodes[node.0].children.clone() {
            let child_clone = self.clone_subtree(child);
            self.nodes[child_clone.0].parent = Some(clone);
            self.nodes[clone.0].children.push(child_clone);
        }
        clone
    }

    /// Structural equality: same node kind, same tag, the same attribute
    /// set (order-insensitive), and pairwise-equal children in order.
    #[must_use]
    pub fn is_equal_node(&self, a: NodeId, b: NodeId) -> bool {
        match (&self.nodes[a.0].kind, &self.nodes[b.0].kind) {
            (NodeKind::Text(ta), NodeKind::Text(tb)) => ta == tb,
            (
                NodeKind::Element {
                    tag: tag_a,
                    attrs: attrs_a,
                },
                NodeKind::Element {
                    tag: tag_b,
                    attrs: attrs_b,
                },
            ) => {
                if tag_a != tag_b || attrs_a.len() != attrs_b.len() {
                    return false;
                }
                let attrs_match = attrs_a
                    .iter()
                    .all(|(n, v)| attrs_b.iter().any(|(n2, v2)| n == n2 && v == v2));
                if !attrs_match {
                    return false;
                }
                let ca = &self.nodes[a.0].children;
                let cb = &self.nodes[b.0].children;
                ca.len() == cb.len()
                    && ca
                        .iter()
                        .zip(cb.iter())
                        .all(|(&x, &y)| self.is_equal_node(x, y))
            }
            _ => false,
        }
    }

    /// Concatenated text of the node and its descendants.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { .. } => {
                for child in &self.nodes[node.0].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Replaces the node's children with a single text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        if !self.is_element(node) {
            return;
        }
        for child in self.nodes[node.0].children.clone() {
            self.nodes[child.0].parent = None;
        }
        self.nodes[node.0].children.clear();
        let text_node = self.create_text(text);
        self.nodes[text_node.0].parent = Some(node);
        self.nodes[node.0].children.push(text_node);
        self.revision += 1;
    }

    /// Associates a base URL with the node, used to address requests for
    /// imported subtrees.
    pub fn set_base_url(&mut self, node: NodeId, url: &str) {
        self.base_urls.insert(node, url.to_string());
    }

    /// The nearest base URL on the node or one of its ancestors.
    #[must_use]
    pub fn base_url(&self, node: NodeId) -> Option<&str> {
        if let Some(url) = self.base_urls.get(&node) {
            return Some(url);
        }
        self.ancestors(node)
            .into_iter()
            .find_map(|a| self.base_urls.get(&a).map(String::as_str))
    }

    /// Depth-first pre-order traversal of the elements under (and
    /// including) `node`.
    #[must_use]
    pub fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(node, &mut out);
        out
    }

    fn collect_elements(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.is_element(node) {
            out.push(node);
        }
        for child in &self.nodes[node.0].children {
            self.collect_elements(*child, out);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_fresh_skeleton() {
        let doc = Document::default();
        assert_eq!(doc.tag(doc.root()), Some("html"));
        assert_eq!(doc.children(doc.root()), &[doc.head(), doc.body()]);
    }

    #[test]
    fn new_document_has_skeleton() {
        let doc = Document::new();
        assert_eq!(doc.tag(doc.root()), Some("html"));
        assert_eq!(doc.children(doc.root()), &[doc.head(), doc.body()]);
        assert_eq!(doc.element_position(doc.body()), Some(2));
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn append_detach_and_reinsert() {
        let mut doc = Document::new();
        let li = doc.create_element("li");
        assert!(!doc.is_connected(li));
        doc.append_child(doc.body(), li).unwrap();
        assert!(doc.is_connected(li));
        assert_eq!(doc.parent(li), Some(doc.body()));

        doc.detach(li);
        assert!(!doc.is_connected(li));
        assert!(doc.children(doc.body()).is_empty());

        doc.append_child(doc.body(), li).unwrap();
        assert_eq!(doc.children(doc.body()), &[li]);
    }

    #[test]
    fn append_rejects_cycles_and_text_parents() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.append_child(doc.body(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        assert_eq!(
            doc.append_child(inner, outer),
            Err(DomError::WouldCycle { node: outer })
        );

        let text = doc.create_text("x");
        let child = doc.create_element("em");
        assert_eq!(
            doc.append_child(text, child),
            Err(DomError::NotAnElement { node: text })
        );
    }

    #[test]
    fn replace_child_swaps_in_place() {
        let mut doc = Document::new();
        let first = doc.create_element("p");
        let second = doc.create_element("p");
        let replacement = doc.create_element("section");
        doc.append_child(doc.body(), first).unwrap();
        doc.append_child(doc.body(), second).unwrap();

        doc.replace_child(doc.body(), replacement, first).unwrap();
        assert_eq!(doc.children(doc.body()), &[replacement, second]);
        assert_eq!(doc.parent(first), None);
        assert_eq!(doc.parent(replacement), Some(doc.body()));

        let stranger = doc.create_element("p");
        assert!(matches!(
            doc.replace_child(doc.body(), stranger, first),
            Err(DomError::NotAChild { .. })
        ));
    }

    #[test]
    fn attributes_are_case_insensitive_and_replace() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attr(el, "Data-Kind", "a");
        assert_eq!(doc.attr(el, "data-kind"), Some("a"));
        doc.set_attr(el, "data-kind", "b");
        assert_eq!(doc.attr(el, "DATA-KIND"), Some("b"));
        assert!(doc.remove_attr(el, "data-kind"));
        assert!(!doc.has_attr(el, "data-kind"));
    }

    #[test]
    fn clone_subtree_is_deep_and_detached() {
        let mut doc = Document::new();
        let ul = doc.create_element("ul");
        doc.set_attr(ul, "id", "list");
        let li = doc.create_element("li");
        doc.set_text_content(li, "one");
        doc.append_child(ul, li).unwrap();
        doc.append_child(doc.body(), ul).unwrap();

        let clone = doc.clone_subtree(ul);
        assert_eq!(doc.parent(clone), None);
        assert!(doc.is_equal_node(ul, clone));

        doc.set_attr(clone, "id", "other");
        assert!(!doc.is_equal_node(ul, clone));
        assert_eq!(doc.attr(ul, "id"), Some("list"));
    }

    #[test]
    fn structural_equality_ignores_attribute_order() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        doc.set_attr(a, "x", "1");
        doc.set_attr(a, "y", "2");
        let b = doc.create_element("div");
        doc.set_attr(b, "y", "2");
        doc.set_attr(b, "x", "1");
        assert!(doc.is_equal_node(a, b));
    }

    #[test]
    fn structural_equality_compares_children_in_order() {
        let mut doc = Document::new();
        let a = doc.create_element("ul");
        let b = doc.create_element("ul");
        for text in ["one", "two"] {
            let li = doc.create_element("li");
            doc.set_text_content(li, text);
            doc.append_child(a, li).unwrap();
        }
        for text in ["two", "one"] {
            let li = doc.create_element("li");
            doc.set_text_content(li, text);
            doc.append_child(b, li).unwrap();
        }
        assert!(!doc.is_equal_node(a, b));
    }

    #[test]
    fn insertion_journal_records_connected_subtrees_only() {
        let mut doc = Document::new();
        let detached_parent = doc.create_element("div");
        let child = doc.create_element("span");
        doc.append_child(detached_parent, child).unwrap();
        // Nothing connected yet.
        assert!(doc.drain_inserted().is_empty());

        doc.append_child(doc.body(), detached_parent).unwrap();
        // The whole subtree becomes visible at once.
        assert_eq!(doc.drain_inserted(), vec![detached_parent, child]);
        assert!(doc.drain_inserted().is_empty());
    }

    #[test]
    fn base_url_is_inherited_from_ancestors() {
        let mut doc = Document::new();
        let imported = doc.create_element("section");
        let inner = doc.create_element("p");
        doc.append_child(imported, inner).unwrap();
        doc.append_child(doc.body(), imported).unwrap();

        doc.set_base_url(imported, "https://other.example/doc");
        assert_eq!(doc.base_url(inner), Some("https://other.example/doc"));
        assert_eq!(doc.base_url(doc.body()), None);
    }

    #[test]
    fn revision_tracks_structural_changes_only() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        let before = doc.revision();
        doc.set_attr(el, "id", "x");
        assert_eq!(doc.revision(), before);
        doc.append_child(doc.body(), el).unwrap();
        assert!(doc.revision() > before);
    }
}
