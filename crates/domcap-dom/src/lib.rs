//! Hosted document tree for `domcap`.
//!
//! This crate provides the substrate the protocol layer operates on: an
//! arena-backed element/text tree ([`Document`]), a minimal HTML fragment
//! parser and serializer ([`html`]), and a CSS selector subset with stable
//! selector derivation ([`selector`]).
//!
//! Nodes are addressed by [`NodeId`] handles. Handles are plain indices into
//! the document arena; they stay valid for the lifetime of the document,
//! including for nodes that have been detached from the tree.
//!
//! # Example
//!
//! ```rust
//! use domcap_dom::{Document, selector};
//!
//! let mut doc = Document::new();
//! let list = doc.create_element("ul");
//! doc.set_attr(list, "id", "tasks");
//! let body = doc.body();
//! doc.append_child(body, list).unwrap();
//!
//! assert_eq!(selector::resolve(&doc, list), "#tasks");
//! ```

pub mod html;
pub mod selector;
mod tree;

pub use html::MarkupError;
pub use selector::{Selector, SelectorError};
pub use tree::{Document, DomError, NodeId, NodeKind};
