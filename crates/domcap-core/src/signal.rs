//! Element-scoped, bubbling success/error signals.
//!
//! Every verb operation reports its outcome here: a success signal
//! carrying the (possibly reconstructed) response, or an error signal
//! carrying the failed response or error plus the verb name. Signals
//! bubble — the dispatch path records the target and its ancestor chain at
//! emission time — and are the sole declarative observation surface; there
//! is no polling API beyond draining the bus.

use domcap_dom::{Document, NodeId};

use crate::error::ClientError;
use crate::transport::{Response, Verb};

/// What went wrong, for error signals.
#[derive(Debug, Clone)]
pub enum SignalCause {
    /// The server answered with a non-success response.
    Response(Response),
    /// The operation failed before or while producing a response.
    Error(ClientError),
}

/// The payload of a signal.
#[derive(Debug, Clone)]
pub enum SignalPayload {
    /// The operation succeeded.
    Ok {
        /// The response observed by the operation (reconstructed when the
        /// original body stream was consumed).
        response: Response,
    },
    /// The operation failed.
    Error {
        /// The verb that failed.
        method: Verb,
        /// The failed response or error.
        cause: SignalCause,
    },
}

/// A dispatched signal.
#[derive(Debug, Clone)]
pub struct Signal {
    /// The element the signal is scoped to.
    pub target: NodeId,
    /// The bubbling path: the target's ancestors at dispatch time,
    /// nearest first.
    pub path: Vec<NodeId>,
    /// Success or error payload.
    pub payload: SignalPayload,
}

impl Signal {
    /// `true` for success signals.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.payload, SignalPayload::Ok { .. })
    }

    /// The response carried by the signal, if any (success responses and
    /// error-response causes).
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match &self.payload {
            SignalPayload::Ok { response } => Some(response),
            SignalPayload::Error {
                cause: SignalCause::Response(response),
                ..
            } => Some(response),
            SignalPayload::Error { .. } => None,
        }
    }
}

/// Drainable signal bus.
#[derive(Debug, Default)]
pub struct SignalBus {
    log: Vec<Signal>,
}

impl SignalBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches a signal scoped to `target`, recording the bubbling
    /// path as it stands right now.
    pub fn emit(&mut self, doc: &Document, target: NodeId, payload: SignalPayload) {
        self.log.push(Signal {
            target,
            path: doc.ancestors(target),
            payload,
        });
    }

    /// Signals dispatched since the last drain, oldest first.
    pub fn drain(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.log)
    }

    /// Number of undrained signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// `true` when no signals are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Response;

    #[test]
    fn emission_records_the_bubbling_path() {
        let mut doc = Document::new();
        let section = doc.create_element("section");
        let item = doc.create_element("li");
        doc.append_child(doc.body(), section).unwrap();
        doc.append_child(section, item).unwrap();

        let mut bus = SignalBus::new();
        bus.emit(
            &doc,
            item,
            SignalPayload::Ok {
                response: Response::new(200),
            },
        );

        let signals = bus.drain();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].target, item);
        assert_eq!(signals[0].path, vec![section, doc.body(), doc.root()]);
        assert!(signals[0].is_ok());
        assert!(bus.is_empty());
    }

    #[test]
    fn error_signals_expose_response_causes() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.append_child(doc.body(), el).unwrap();

        let mut bus = SignalBus::new();
        bus.emit(
            &doc,
            el,
            SignalPayload::Error {
                method: Verb::Put,
                cause: SignalCause::Response(Response::new(409)),
            },
        );
        let signals = bus.drain();
        assert!(!signals[0].is_ok());
        assert_eq!(signals[0].response().map(Response::status), Some(409));
    }
}
