//! Capability gates: declarative show/hide driven by the selector table.
//!
//! A gate element names a `(method, selector)` pair in its attributes and
//! is shown or hidden by whether the selector table currently permits that
//! pair. The two tags are one mechanism with an inverted polarity bit:
//! `http-can` shows on a grant, `http-cannot` shows on its absence. Both
//! start inert and resolve to exactly one of the two terminal states; a
//! gate that cannot be evaluated (missing attributes, unknown verb,
//! unparsable or unmatched selector) counts as not granted, which still
//! resolves it.

use tracing::debug;

use domcap_dom::selector::{self, Selector};
use domcap_dom::{Document, NodeId};

use crate::session::Session;
use crate::transition::{run_scoped, TransitionHost};
use crate::transport::Verb;

/// Tag of the positive-polarity gate.
pub const GATE_CAN_TAG: &str = "http-can";
/// Tag of the inverted gate.
pub const GATE_CANNOT_TAG: &str = "http-cannot";

const STYLE_VISIBLE: &str = "display: inherit;";
const STYLE_HIDDEN: &str = "display: none;";

/// The terminal state a gate resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// The gate is shown.
    Can,
    /// The gate is hidden.
    Cannot,
}

impl GateState {
    /// The state name written to the gate's `data-state` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GateState::Can => "can",
            GateState::Cannot => "cannot",
        }
    }
}

impl Session {
    fn gate_target_granted(&self, doc: &Document, gate: NodeId) -> bool {
        let Some(method) = doc.attr(gate, "method").and_then(Verb::parse) else {
            debug!(%gate, "gate missing or unknown method attribute");
            return false;
        };
        let Some(raw) = doc.attr(gate, "selector") else {
            debug!(%gate, "gate missing selector attribute");
            return false;
        };
        let Ok(parsed) = Selector::parse(raw) else {
            debug!(%gate, selector = raw, "gate selector does not parse");
            return false;
        };
        let Some(target) = selector::query_first(doc, doc.root(), &parsed) else {
            debug!(%gate, selector = raw, "gate selector matches nothing");
            return false;
        };
        self.table.allows(doc, target, method)
    }

    /// Resolves every gate element in the document.
    pub fn resolve_gates(&mut self, doc: &mut Document, transitions: &mut dyn TransitionHost) {
        let gates: Vec<NodeId> = doc
            .descendant_elements(doc.root())
            .into_iter()
            .filter(|&n| {
                doc.tag(n)
                    .is_some_and(|t| t == GATE_CAN_TAG || t == GATE_CANNOT_TAG)
            })
            .collect();
        for gate in gates {
            self.resolve_gate(doc, gate, transitions);
        }
    }

    /// Resolves one gate element to its terminal state.
    ///
    /// The gate is inert while its grant is evaluated, then shown or
    /// hidden inside a transition boundary. The terminal state is recorded
    /// on the element as `data-state` and in the session.
    pub fn resolve_gate(
        &mut self,
        doc: &mut Document,
        gate: NodeId,
        transitions: &mut dyn TransitionHost,
    ) {
        let Some(tag) = doc.tag(gate).map(str::to_string) else {
            return;
        };
        let inverted = match tag.as_str() {
            GATE_CAN_TAG => false,
            GATE_CANNOT_TAG => true,
            _ => return,
        };

        doc.set_attr(gate, "inert", "");
        let granted = self.gate_target_granted(doc, gate);
        let visible = granted != inverted;

        run_scoped(transitions, || {
            if visible {
                doc.set_attr(gate, "style", STYLE_VISIBLE);
                doc.remove_attr(gate, "inert");
            } else {
                doc.set_attr(gate, "style", STYLE_HIDDEN);
            }
        });

        let state = if visible {
            GateState::Can
        } else {
            GateState::Cannot
        };
        doc.set_attr(gate, "data-state", state.as_str());
        self.gate_states.insert(gate, state);
    }
}
