//! Capability negotiation and reconciliation over a live document tree.
//!
//! A [`Session`] discovers, per element, which HTTP verbs the hosting
//! server permits (one multipart OPTIONS round trip), injects those
//! capabilities as per-element state, and exposes the verb operations —
//! GET, POST, PUT, DELETE — as tree reconciliation against the server's
//! accepted representation. Outcomes are dual-reported: a return value for
//! the direct caller and a bubbling [`Signal`] for declarative observers.
//!
//! Elements are addressed on the wire by selectors derived from their
//! position (see [`domcap_dom::selector::resolve`]), carried in `Range`
//! and `Content-Range` headers. The crate performs no I/O of its own;
//! callers plug in a [`Transport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use domcap_core::{ClientConfig, NoTransitions, Session};
//! use domcap_dom::Document;
//! # async fn demo(transport: &dyn domcap_core::Transport) {
//! let mut doc = Document::new();
//! let mut session = Session::new(ClientConfig::for_location("https://host.example/page"));
//! let mut transitions = NoTransitions;
//! session.start(&mut doc, transport, &mut transitions).await;
//! # }
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod gate;
pub mod headers;
pub mod multipart;
pub mod observe;
pub mod reconcile;
pub mod session;
pub mod signal;
pub mod transition;
pub mod transport;

mod inject;
mod negotiate;

pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use gate::{GateState, GATE_CANNOT_TAG, GATE_CAN_TAG};
pub use headers::HeaderMap;
pub use multipart::MultipartBody;
pub use reconcile::{PostContent, PutOutcome};
pub use session::{CapabilityTable, Session, VerbSet, DELETE_COMMAND};
pub use signal::{Signal, SignalBus, SignalCause, SignalPayload};
pub use transition::{run_scoped, NoTransitions, TransitionHost};
pub use transport::{
    parse_allow, MockTransport, Request, Response, Transport, TransportError, Verb,
};
