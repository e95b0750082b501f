//! Capability injection.
//!
//! Discovery yields `(selector, verbs)` grants; injection turns each into
//! per-element state. A PUT grant additionally marks every match editable,
//! and a DELETE grant arms the one-shot delete-command listener on every
//! match, now and for future insertions via a mutation watch. Injection is
//! idempotent: a verb bit is set at most once per element, the editable
//! marker is an attribute write, and watches are registered at most once
//! per selector.

use tracing::debug;

use domcap_dom::selector::{self, Selector};
use domcap_dom::Document;

use crate::observe::WatchKind;
use crate::session::Session;
use crate::transport::Verb;

impl Session {
    /// Applies one discovery grant: sets verb bits on every element
    /// currently matching `selector_raw`, with the PUT and DELETE side
    /// effects.
    ///
    /// Unparsable selectors are logged and skipped; a grant naming a
    /// selector this client cannot evaluate grants nothing.
    pub(crate) fn inject(&mut self, doc: &mut Document, selector_raw: &str, verbs: &[Verb]) {
        let parsed = match Selector::parse(selector_raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(selector = selector_raw, %error, "skipping unevaluable grant");
                return;
            }
        };
        let matches = selector::query_all(doc, doc.root(), &parsed);

        let editable_attr = self.config.editable_attr.clone();
        let editable_value = self.config.editable_value.clone();

        for &verb in verbs {
            match verb {
                Verb::Put => {
                    for &node in &matches {
                        self.grant_capability(node, Verb::Put);
                        doc.set_attr(node, &editable_attr, &editable_value);
                    }
                }
                Verb::Delete => {
                    for &node in &matches {
                        if self.grant_capability(node, Verb::Delete) {
                            self.armed_delete.insert(node);
                        }
                    }
                    if !self.delete_selectors.iter().any(|s| s == selector_raw) {
                        self.delete_selectors.push(selector_raw.to_string());
                    }
                    if !self.observer.has_watch(selector_raw, WatchKind::ArmDelete) {
                        self.observer.watch(
                            parsed.clone(),
                            selector_raw,
                            true,
                            WatchKind::ArmDelete,
                        );
                    }
                }
                Verb::Get | Verb::Post | Verb::Options => {
                    for &node in &matches {
                        self.grant_capability(node, verb);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use domcap_dom::Document;

    use crate::session::Session;
    use crate::transport::Verb;

    #[test]
    fn put_grant_sets_bit_and_editable_marker() {
        let mut doc = Document::new();
        let el = doc.create_element("p");
        doc.set_attr(el, "id", "note");
        doc.append_child(doc.body(), el).unwrap();

        let mut session = Session::with_defaults();
        session.inject(&mut doc, "#note", &[Verb::Put]);

        assert!(session.has_capability(el, Verb::Put));
        assert_eq!(doc.attr(el, "contenteditable"), Some("plaintext-only"));
    }

    #[test]
    fn delete_grant_arms_existing_matches_and_future_insertions() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        let first = doc.create_element("li");
        doc.append_child(doc.body(), list).unwrap();
        doc.append_child(list, first).unwrap();
        doc.drain_inserted();

        let mut session = Session::with_defaults();
        session.inject(&mut doc, "li", &[Verb::Delete]);
        assert!(session.is_delete_armed(first));
        assert_eq!(session.delete_selectors(), ["li"]);

        // A later insertion is picked up through the watch.
        let second = doc.create_element("li");
        doc.append_child(list, second).unwrap();
        let events = session.observer.drain(&mut doc);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node, second);
    }

    #[test]
    fn repeated_injection_is_idempotent() {
        let mut doc = Document::new();
        let el = doc.create_element("li");
        doc.append_child(doc.body(), el).unwrap();

        let mut session = Session::with_defaults();
        session.inject(&mut doc, "li", &[Verb::Delete, Verb::Get]);
        session.inject(&mut doc, "li", &[Verb::Delete, Verb::Get]);

        assert_eq!(session.delete_selectors(), ["li"]);
        assert!(session.is_delete_armed(el));
        assert!(session.has_capability(el, Verb::Get));
    }

    #[test]
    fn unparsable_selector_grants_nothing() {
        let mut doc = Document::new();
        let el = doc.create_element("li");
        doc.append_child(doc.body(), el).unwrap();

        let mut session = Session::with_defaults();
        session.inject(&mut doc, ":::", &[Verb::Get]);
        assert!(!session.has_capability(el, Verb::Get));
    }

    #[test]
    fn grants_cover_every_current_match() {
        let mut doc = Document::new();
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(doc.body(), b).unwrap();

        let mut session = Session::with_defaults();
        session.inject(&mut doc, "li", &[Verb::Post]);
        assert!(session.has_capability(a, Verb::Post));
        assert!(session.has_capability(b, Verb::Post));
    }
}
