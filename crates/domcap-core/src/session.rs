//! The negotiation session: capability state and its lifecycle.
//!
//! All capability state lives in one explicit [`Session`] object rather
//! than ambient globals: the selector table learned from discovery, the
//! per-element verb bits, the armed delete listeners, the mutation
//! watches, and the signal bus. The table is rebuilt from scratch on every
//! negotiation run; verb bits, once set, stay for the element's lifetime
//! and move only on replacement.
//!
//! # Capability model
//!
//! An element "has" a verb operation when its bit is set in the session's
//! side table — presence of the bit is the single source of truth, there
//! is no separate flag. Dispatch is a lookup: the reconcile methods check
//! the bit and run; nothing is retrofitted onto the tree.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use domcap_dom::selector::{self, Selector};
use domcap_dom::{Document, NodeId};

use crate::config::ClientConfig;
use crate::gate::GateState;
use crate::headers::HeaderMap;
use crate::observe::{MutationObserver, WatchKind};
use crate::signal::{Signal, SignalBus};
use crate::transition::TransitionHost;
use crate::transport::{Transport, Verb};

/// The command string that triggers an armed DELETE listener.
pub const DELETE_COMMAND: &str = "--delete";

/// A small per-element verb bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerbSet(u8);

impl VerbSet {
    /// The empty set.
    pub const EMPTY: VerbSet = VerbSet(0);

    const fn bit(verb: Verb) -> u8 {
        match verb {
            Verb::Get => 1,
            Verb::Post => 1 << 1,
            Verb::Put => 1 << 2,
            Verb::Delete => 1 << 3,
            Verb::Options => 1 << 4,
        }
    }

    /// `true` when the verb bit is set.
    #[must_use]
    pub const fn contains(self, verb: Verb) -> bool {
        self.0 & Self::bit(verb) != 0
    }

    /// Sets the verb bit. Returns `true` when it was newly set.
    pub fn insert(&mut self, verb: Verb) -> bool {
        let before = self.0;
        self.0 |= Self::bit(verb);
        self.0 != before
    }

    /// `true` when no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The verbs present, in fixed order.
    pub fn iter(self) -> impl Iterator<Item = Verb> {
        Verb::ALL.into_iter().filter(move |&v| self.contains(v))
    }
}

/// The selector table learned from discovery: verb name to the ordered
/// selectors currently known to be permitted that verb.
#[derive(Debug, Default)]
pub struct CapabilityTable {
    verbs: HashMap<Verb, Vec<String>>,
}

impl CapabilityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a `(verb, selector)` grant. Duplicate selectors per verb
    /// are tolerated but redundant.
    pub fn grant(&mut self, verb: Verb, selector: &str) {
        self.verbs
            .entry(verb)
            .or_default()
            .push(selector.to_string());
    }

    /// Selectors recorded under `verb`, in discovery order.
    #[must_use]
    pub fn selectors(&self, verb: Verb) -> &[String] {
        self.verbs.get(&verb).map_or(&[], Vec::as_slice)
    }

    /// `true` when `node` currently matches any selector recorded under
    /// `verb`. Unparsable selectors are skipped.
    #[must_use]
    pub fn allows(&self, doc: &Document, node: NodeId, verb: Verb) -> bool {
        self.selectors(verb).iter().any(|raw| {
            Selector::parse(raw)
                .map(|parsed| selector::matches(doc, node, &parsed))
                .unwrap_or(false)
        })
    }

    /// Clears every grant.
    pub fn clear(&mut self) {
        self.verbs.clear();
    }

    /// `true` when no grants are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verbs.values().all(Vec::is_empty)
    }
}

/// A capability-negotiation session over one document.
///
/// Create one per hosted document, [`Session::start`] it, then
/// [`Session::pump`] after batches of tree mutation. Verb operations live
/// on this type (see the `reconcile` module) and report through the
/// session's signal bus.
#[derive(Debug)]
pub struct Session {
    pub(crate) config: ClientConfig,
    pub(crate) table: CapabilityTable,
    pub(crate) caps: HashMap<NodeId, VerbSet>,
    pub(crate) delete_selectors: Vec<String>,
    pub(crate) armed_delete: HashSet<NodeId>,
    pub(crate) bus: SignalBus,
    pub(crate) observer: MutationObserver,
    pub(crate) gate_states: HashMap<NodeId, GateState>,
}

impl Session {
    /// Creates a session with the given configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            table: CapabilityTable::new(),
            caps: HashMap::new(),
            delete_selectors: Vec::new(),
            armed_delete: HashSet::new(),
            bus: SignalBus::new(),
            observer: MutationObserver::new(),
            gate_states: HashMap::new(),
        }
    }

    /// Creates a session with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::default())
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The current capability table.
    #[must_use]
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// `true` when `node` holds the `verb` capability bit.
    #[must_use]
    pub fn has_capability(&self, node: NodeId, verb: Verb) -> bool {
        self.caps.get(&node).is_some_and(|set| set.contains(verb))
    }

    /// The verb set attached to `node`.
    #[must_use]
    pub fn capabilities(&self, node: NodeId) -> VerbSet {
        self.caps.get(&node).copied().unwrap_or(VerbSet::EMPTY)
    }

    /// Sets a verb bit. Returns `true` when it was newly set.
    pub(crate) fn grant_capability(&mut self, node: NodeId, verb: Verb) -> bool {
        self.caps.entry(node).or_default().insert(verb)
    }

    /// Drops every capability of a node that was replaced in the tree.
    pub(crate) fn revoke_capabilities(&mut self, node: NodeId) {
        self.caps.remove(&node);
        self.armed_delete.remove(&node);
    }

    /// Selectors whose matches carry the DELETE capability.
    #[must_use]
    pub fn delete_selectors(&self) -> &[String] {
        &self.delete_selectors
    }

    /// `true` when the one-shot delete-command listener is armed for
    /// `node`.
    #[must_use]
    pub fn is_delete_armed(&self, node: NodeId) -> bool {
        self.armed_delete.contains(&node)
    }

    /// The recorded terminal state of a resolved gate element.
    #[must_use]
    pub fn gate_state(&self, node: NodeId) -> Option<GateState> {
        self.gate_states.get(&node).copied()
    }

    /// Signals dispatched since the last drain.
    pub fn drain_signals(&mut self) -> Vec<Signal> {
        self.bus.drain()
    }

    /// Runs initial discovery, arms renegotiation on document growth, and
    /// resolves capability gates.
    pub async fn start(
        &mut self,
        doc: &mut Document,
        transport: &dyn Transport,
        transitions: &mut dyn TransitionHost,
    ) {
        self.negotiate(doc, transport).await;
        if !self.observer.has_watch("*", WatchKind::Renegotiate) {
            if let Ok(universal) = Selector::parse("*") {
                self.observer
                    .watch(universal, "*", true, WatchKind::Renegotiate);
            }
        }
        // Insertions that predate the session are not growth; the watches
        // start counting from here.
        doc.drain_inserted();
        self.resolve_gates(doc, transitions);
    }

    /// Consumes pending mutation events: arms delete listeners on new
    /// matches of DELETE-capable selectors and re-runs discovery when the
    /// document grew.
    pub async fn pump(&mut self, doc: &mut Document, transport: &dyn Transport) {
        let events = self.observer.drain(doc);
        let mut renegotiate = false;
        for event in events {
            match event.kind {
                WatchKind::Renegotiate => renegotiate = true,
                WatchKind::ArmDelete => {
                    if self.grant_capability(event.node, Verb::Delete) {
                        self.armed_delete.insert(event.node);
                    }
                }
            }
        }
        if renegotiate && self.config.renegotiate_on_mutation {
            self.negotiate(doc, transport).await;
        }
    }

    /// Delivers an explicit command to an element. Returns `true` when an
    /// armed listener consumed it.
    ///
    /// The delete listener is one-shot: it disarms before the operation
    /// runs, and the operation reports only through signals from this
    /// declarative path.
    pub async fn dispatch_command(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        command: &str,
        transport: &dyn Transport,
        transitions: &mut dyn TransitionHost,
    ) -> bool {
        if command != DELETE_COMMAND || !self.armed_delete.remove(&node) {
            return false;
        }
        if let Err(error) = self.delete(doc, node, transport, transitions).await {
            debug!(%error, "delete command failed; reported via signal");
        }
        true
    }

    /// The URL a request scoped to `node` addresses: the node's nearest
    /// base URL, falling back to the configured location.
    pub(crate) fn request_url(&self, doc: &Document, node: NodeId) -> String {
        doc.base_url(node)
            .unwrap_or(&self.config.location)
            .to_string()
    }

    /// Headers addressing `node`: `Range: selector=<derived selector>`.
    pub(crate) fn range_headers(&self, doc: &Document, node: NodeId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.set(
            "Range",
            &format!("selector={}", selector::resolve(doc, node)),
        );
        headers
    }
}
