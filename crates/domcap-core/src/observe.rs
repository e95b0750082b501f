//! Mutation watching over the document insertion journal.
//!
//! The passive observation mechanism itself lives outside this system;
//! this module implements its collaborator contract: a watch registered
//! with `ignore_existing = false` fires once per currently matching
//! element at the first drain, and every watch thereafter fires once per
//! newly inserted matching element. The session wires two watch kinds:
//! document growth re-runs negotiation, and DELETE-capable selectors arm
//! the per-element delete-command listener.

use std::collections::HashSet;

use domcap_dom::selector::{self, Selector};
use domcap_dom::{Document, NodeId};

/// Why a watch exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Document growth: re-run capability discovery.
    Renegotiate,
    /// A DELETE-capable selector: arm the delete-command listener on new
    /// matches.
    ArmDelete,
}

/// A watch firing for a matching element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    /// The matching element.
    pub node: NodeId,
    /// The kind of watch that fired.
    pub kind: WatchKind,
}

#[derive(Debug)]
struct Watch {
    selector: Selector,
    raw: String,
    kind: WatchKind,
    deliver_existing: bool,
}

/// Registry of mutation watches.
#[derive(Debug, Default)]
pub struct MutationObserver {
    watches: Vec<Watch>,
}

impl MutationObserver {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watch. With `ignore_existing = false` the next drain
    /// delivers every currently matching element before any insertions.
    pub fn watch(&mut self, selector: Selector, raw: &str, ignore_existing: bool, kind: WatchKind) {
        self.watches.push(Watch {
            selector,
            raw: raw.to_string(),
            kind,
            deliver_existing: !ignore_existing,
        });
    }

    /// `true` when a watch for this pattern and kind is already
    /// registered.
    #[must_use]
    pub fn has_watch(&self, raw: &str, kind: WatchKind) -> bool {
        self.watches.iter().any(|w| w.raw == raw && w.kind == kind)
    }

    /// Drains pending deliveries: initial matches for fresh watches, then
    /// one event per watch per newly inserted matching element. Each
    /// drain consumes the document's insertion journal.
    pub fn drain(&mut self, doc: &mut Document) -> Vec<MutationEvent> {
        let inserted = doc.drain_inserted();
        let mut events = Vec::new();
        for watch in &mut self.watches {
            let mut delivered: HashSet<NodeId> = HashSet::new();
            if watch.deliver_existing {
                watch.deliver_existing = false;
                for node in selector::query_all(doc, doc.root(), &watch.selector) {
                    if delivered.insert(node) {
                        events.push(MutationEvent {
                            node,
                            kind: watch.kind,
                        });
                    }
                }
            }
            for &node in &inserted {
                if doc.is_connected(node)
                    && selector::matches(doc, node, &watch.selector)
                    && delivered.insert(node)
                {
                    events.push(MutationEvent {
                        node,
                        kind: watch.kind,
                    });
                }
            }
        }
        events
    }
}
