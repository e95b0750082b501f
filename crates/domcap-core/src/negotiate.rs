//! Capability discovery.
//!
//! One OPTIONS round trip learns which verbs each subset of elements may
//! use. The response is either multipart — one part per selector, each
//! carrying `Content-Range: selector=<S>` and `Allow` — or a plain
//! response whose `Allow` header applies document-wide. Discovery failure
//! is never an error: the endpoint may not negotiate at all, so a failed
//! round simply grants nothing.

use tracing::debug;

use domcap_dom::{Document, NodeId};

use crate::error::ClientError;
use crate::multipart::MultipartBody;
use crate::session::Session;
use crate::signal::{SignalCause, SignalPayload};
use crate::transport::{parse_allow, Request, Transport, Verb};

impl Session {
    /// Runs batch discovery against the configured location and injects
    /// every discovered `(selector, verbs)` grant.
    ///
    /// Idempotent in effect though not memoized: each call re-issues the
    /// OPTIONS request and rebuilds the capability table from the
    /// response. Called once at startup and again after every
    /// tree-mutation notification.
    pub async fn negotiate(&mut self, doc: &mut Document, transport: &dyn Transport) {
        self.table.clear();

        let mut request = Request::new(Verb::Options, self.config.location.clone());
        request.headers.set("Prefer", "return=representation");
        request.headers.set("Accept", "multipart/mixed");

        let mut response = match transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "capability discovery failed; nothing granted this round");
                return;
            }
        };
        if !response.ok() {
            debug!(
                status = response.status(),
                "capability discovery rejected; nothing granted this round"
            );
            return;
        }

        if let Some(boundary) = response
            .headers()
            .content_type_boundary()
            .map(str::to_string)
        {
            let Some(body) = response.take_body() else {
                debug!("multipart discovery response carried no body");
                return;
            };
            for part in MultipartBody::new(&body, &boundary).parts() {
                let Some(selector) = part.content_range_selector().map(str::to_string) else {
                    continue;
                };
                let Some(allow) = part.get("allow") else {
                    debug!(selector, "discovery part missing Allow header");
                    continue;
                };
                let verbs = parse_allow(allow);
                for &verb in &verbs {
                    self.table.grant(verb, &selector);
                }
                self.inject(doc, &selector, &verbs);
            }
        } else if let Some(allow) = response.headers().get("allow").map(str::to_string) {
            let verbs = parse_allow(&allow);
            let selector = self.config.document_selector.clone();
            debug!(selector, allow, "document-wide capability grant");
            self.inject(doc, &selector, &verbs);
        }
    }

    /// Per-element discovery: asks which verbs this element alone may
    /// use, via `Range: selector=<derived selector>`.
    ///
    /// This is a capability query for callers outside the batch-discovery
    /// flow; it never mutates the capability table.
    ///
    /// # Errors
    ///
    /// Transport failure dispatches the bubbling error signal and
    /// re-raises as [`ClientError::Transport`].
    pub async fn query_allowed(
        &mut self,
        doc: &Document,
        node: NodeId,
        transport: &dyn Transport,
    ) -> Result<Vec<Verb>, ClientError> {
        let mut request = Request::new(Verb::Options, self.request_url(doc, node));
        request.headers = self.range_headers(doc, node);

        match transport.send(request).await {
            Ok(response) => Ok(response
                .headers()
                .get("allow")
                .map(parse_allow)
                .unwrap_or_default()),
            Err(error) => {
                let error = ClientError::from(error);
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Options,
                        cause: SignalCause::Error(error.clone()),
                    },
                );
                Err(error)
            }
        }
    }
}
