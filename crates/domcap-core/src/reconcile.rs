//! The verb operations: GET, POST, PUT, DELETE against the live tree.
//!
//! Each operation gates on the element's capability bit, issues one
//! request scoped by the element's derived selector, reconciles the tree
//! with the response, and dual-reports the outcome: a bubbling signal for
//! declarative observers plus the returned value for the direct caller.
//! Non-success responses are protocol outcomes, not errors — they signal
//! and return `Ok`; only exceptional failures (transport, parse,
//! precondition, capability) return `Err`.

use tracing::{debug, warn};

use domcap_dom::{html, Document, NodeId};

use crate::error::ClientError;
use crate::session::Session;
use crate::signal::{SignalCause, SignalPayload};
use crate::transition::{run_scoped, TransitionHost};
use crate::transport::{Request, Response, Transport, TransportError, Verb};

/// Content accepted by [`Session::post`].
#[derive(Debug, Clone, Copy)]
pub enum PostContent<'a> {
    /// A raw markup string, parsed from the response echo on success.
    Markup(&'a str),
    /// An existing element; its outer markup is sent.
    Element(NodeId),
    /// An existing element used as a fragment container; its children's
    /// markup is sent.
    Fragment(NodeId),
}

/// What a PUT did to the tree.
#[derive(Debug)]
pub struct PutOutcome {
    /// The element now standing at the target's position: the original on
    /// the idempotent fast path, the replacement otherwise.
    pub node: NodeId,
    /// The response the operation observed.
    pub response: Response,
    /// `true` when the target was replaced by a new element.
    pub replaced: bool,
}

impl Session {
    fn require_capability(&self, node: NodeId, verb: Verb) -> Result<(), ClientError> {
        if self.has_capability(node, verb) {
            Ok(())
        } else {
            Err(ClientError::CapabilityNotGranted { verb })
        }
    }

    /// Fetches the server's current representation of `node`. Used by PUT
    /// recovery; deliberately not gated on the GET bit.
    async fn fetch_representation(
        &self,
        doc: &Document,
        node: NodeId,
        transport: &dyn Transport,
    ) -> Result<Response, TransportError> {
        let mut request = Request::new(Verb::Get, self.request_url(doc, node));
        request.headers = self.range_headers(doc, node);
        transport.send(request).await
    }

    /// Fetches the representation of `node`.
    ///
    /// Signals success or failure by response status; the tree is never
    /// mutated.
    ///
    /// # Errors
    ///
    /// [`ClientError::CapabilityNotGranted`] without a signal when the GET
    /// bit is absent; [`ClientError::Transport`] (signaled) when the
    /// request fails.
    pub async fn get(
        &mut self,
        doc: &Document,
        node: NodeId,
        transport: &dyn Transport,
    ) -> Result<Response, ClientError> {
        self.require_capability(node, Verb::Get)?;
        match self.fetch_representation(doc, node, transport).await {
            Ok(response) => {
                let payload = if response.ok() {
                    SignalPayload::Ok {
                        response: response.clone(),
                    }
                } else {
                    SignalPayload::Error {
                        method: Verb::Get,
                        cause: SignalCause::Response(response.clone()),
                    }
                };
                self.bus.emit(doc, node, payload);
                Ok(response)
            }
            Err(error) => {
                let error = ClientError::from(error);
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Get,
                        cause: SignalCause::Error(error.clone()),
                    },
                );
                Err(error)
            }
        }
    }

    fn serialize_post_content(
        &self,
        doc: &Document,
        content: PostContent<'_>,
    ) -> Result<String, ClientError> {
        match content {
            PostContent::Markup(markup) => {
                let markup = markup.trim();
                if markup.is_empty() {
                    return Err(ClientError::invalid_argument(
                        "POST content must be a non-empty markup string, an element, \
                         or a fragment container",
                    ));
                }
                Ok(markup.to_string())
            }
            PostContent::Element(el) => {
                if !doc.is_element(el) {
                    return Err(ClientError::invalid_argument(
                        "POST content node must be an element",
                    ));
                }
                Ok(html::serialize(doc, el))
            }
            PostContent::Fragment(container) => {
                if !doc.is_element(container) {
                    return Err(ClientError::invalid_argument(
                        "POST fragment container must be an element",
                    ));
                }
                Ok(html::serialize_children(doc, container))
            }
        }
    }

    /// Appends content under `node` by POSTing it to the element's scope
    /// and reconciling the echoed representation into the tree.
    ///
    /// On a success response carrying an HTML body, the echo is parsed and
    /// appended as the element's new last child inside a transition
    /// boundary, and the success signal carries a reconstructed response
    /// (the original body stream was consumed by parsing). A non-success
    /// response signals an error and returns `Ok` untouched.
    ///
    /// # Errors
    ///
    /// Invalid content shapes fail before any request is issued.
    /// Transport, parse, and append failures are signaled and returned.
    pub async fn post(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        content: PostContent<'_>,
        transport: &dyn Transport,
        transitions: &mut dyn TransitionHost,
    ) -> Result<Response, ClientError> {
        self.require_capability(node, Verb::Post)?;
        let body = match self.serialize_post_content(doc, content) {
            Ok(body) => body,
            Err(error) => {
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Post,
                        cause: SignalCause::Error(error.clone()),
                    },
                );
                return Err(error);
            }
        };

        let mut request = Request::new(Verb::Post, self.request_url(doc, node));
        request.headers = self.range_headers(doc, node);
        request.headers.set("Content-Type", "text/html");
        request.body = Some(body);

        let mut response = match transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                let error = ClientError::from(error);
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Post,
                        cause: SignalCause::Error(error.clone()),
                    },
                );
                return Err(error);
            }
        };

        if response.ok() && response.is_html() {
            if let Some(echo) = response.take_body().filter(|b| !b.trim().is_empty()) {
                let appended = match html::parse_single(doc, &echo) {
                    Ok(appended) => appended,
                    Err(error) => {
                        let error = ClientError::from(error);
                        self.bus.emit(
                            doc,
                            node,
                            SignalPayload::Error {
                                method: Verb::Post,
                                cause: SignalCause::Error(error.clone()),
                            },
                        );
                        return Err(error);
                    }
                };
                if let Err(error) =
                    run_scoped(transitions, || doc.append_child(node, appended))
                {
                    let error = ClientError::precondition(error.to_string());
                    self.bus.emit(
                        doc,
                        node,
                        SignalPayload::Error {
                            method: Verb::Post,
                            cause: SignalCause::Error(error.clone()),
                        },
                    );
                    return Err(error);
                }
                let response = response.reconstruct(&echo);
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Ok {
                        response: response.clone(),
                    },
                );
                return Ok(response);
            }
        }

        let payload = if response.ok() {
            SignalPayload::Ok {
                response: response.clone(),
            }
        } else {
            SignalPayload::Error {
                method: Verb::Post,
                cause: SignalCause::Response(response.clone()),
            }
        };
        self.bus.emit(doc, node, payload);
        Ok(response)
    }

    /// Replaces `node` with the server's accepted representation of its
    /// own serialized markup.
    ///
    /// The editable marker attribute is stripped from the sent markup and
    /// restored on whatever element ends up in the tree. When the echo is
    /// structurally equal to the current element, the tree is left
    /// untouched (the idempotent fast path) and the success signal targets
    /// the original element. Otherwise the replacement swaps in inside a
    /// transition boundary, carries the PUT bit forward, and the success
    /// signal targets the new element.
    ///
    /// A non-success response attempts recovery: the server's current
    /// representation is fetched and swapped in, and the error signal on
    /// the new element carries a response reconstructed with the failed
    /// status around the recovered body. If recovery itself fails, the
    /// error signal stays on the original, untouched element. Either way
    /// the method returns `Ok`.
    ///
    /// # Errors
    ///
    /// [`ClientError::CapabilityNotGranted`] without a signal when the PUT
    /// bit is absent; [`ClientError::Precondition`] (signaled) on a
    /// detached element; [`ClientError::Transport`] and
    /// [`ClientError::Parse`] (signaled) when the request or echo fails.
    pub async fn put(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        transport: &dyn Transport,
        transitions: &mut dyn TransitionHost,
    ) -> Result<PutOutcome, ClientError> {
        self.require_capability(node, Verb::Put)?;
        let Some(parent) = doc.parent(node) else {
            let error = ClientError::precondition("element must be attached to use PUT");
            self.bus.emit(
                doc,
                node,
                SignalPayload::Error {
                    method: Verb::Put,
                    cause: SignalCause::Error(error.clone()),
                },
            );
            return Err(error);
        };

        let editable_attr = self.config.editable_attr.clone();
        let editable_value = self.config.editable_value.clone();

        // The marker is client-side state; the server never sees it.
        let staging = doc.clone_subtree(node);
        let had_editable = doc.remove_attr(staging, &editable_attr);
        let markup = html::serialize(doc, staging);

        let mut request = Request::new(Verb::Put, self.request_url(doc, node));
        request.headers = self.range_headers(doc, node);
        request.headers.set("Content-Type", "text/html");
        request.body = Some(markup);

        let mut response = match transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                let error = ClientError::from(error);
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Put,
                        cause: SignalCause::Error(error.clone()),
                    },
                );
                return Err(error);
            }
        };

        if response.ok() {
            if response.is_html() {
                if let Some(echo) = response.take_body().filter(|b| !b.trim().is_empty()) {
                    let accepted = match html::parse_single(doc, &echo) {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            let error = ClientError::from(error);
                            self.bus.emit(
                                doc,
                                node,
                                SignalPayload::Error {
                                    method: Verb::Put,
                                    cause: SignalCause::Error(error.clone()),
                                },
                            );
                            return Err(error);
                        }
                    };
                    if had_editable {
                        doc.set_attr(accepted, &editable_attr, &editable_value);
                    }
                    let response = response.reconstruct(&echo);
                    if doc.is_equal_node(accepted, node) {
                        // Idempotent fast path: the server accepted exactly
                        // what we hold; no structural churn.
                        self.bus.emit(
                            doc,
                            node,
                            SignalPayload::Ok {
                                response: response.clone(),
                            },
                        );
                        return Ok(PutOutcome {
                            node,
                            response,
                            replaced: false,
                        });
                    }
                    self.grant_capability(accepted, Verb::Put);
                    if let Err(error) =
                        run_scoped(transitions, || doc.replace_child(parent, accepted, node))
                    {
                        let error = ClientError::precondition(error.to_string());
                        self.bus.emit(
                            doc,
                            node,
                            SignalPayload::Error {
                                method: Verb::Put,
                                cause: SignalCause::Error(error.clone()),
                            },
                        );
                        return Err(error);
                    }
                    self.revoke_capabilities(node);
                    self.bus.emit(
                        doc,
                        accepted,
                        SignalPayload::Ok {
                            response: response.clone(),
                        },
                    );
                    return Ok(PutOutcome {
                        node: accepted,
                        response,
                        replaced: true,
                    });
                }
            }
            // Success without a representation echo: accepted as sent.
            self.bus.emit(
                doc,
                node,
                SignalPayload::Ok {
                    response: response.clone(),
                },
            );
            return Ok(PutOutcome {
                node,
                response,
                replaced: false,
            });
        }

        // The server rejected the representation. Try to converge on its
        // current one before reporting the failure.
        match self.fetch_representation(doc, node, transport).await {
            Ok(mut recovery) if recovery.ok() => {
                if let Some(body) = recovery.take_body().filter(|b| !b.trim().is_empty()) {
                    match html::parse_single(doc, &body) {
                        Ok(current) => {
                            if had_editable {
                                doc.set_attr(current, &editable_attr, &editable_value);
                            }
                            self.grant_capability(current, Verb::Put);
                            if run_scoped(transitions, || {
                                doc.replace_child(parent, current, node)
                            })
                            .is_ok()
                            {
                                self.revoke_capabilities(node);
                                self.bus.emit(
                                    doc,
                                    current,
                                    SignalPayload::Error {
                                        method: Verb::Put,
                                        cause: SignalCause::Response(
                                            response.reconstruct(&body),
                                        ),
                                    },
                                );
                                return Ok(PutOutcome {
                                    node: current,
                                    response,
                                    replaced: true,
                                });
                            }
                            warn!("recovery replacement failed; element left as sent");
                        }
                        Err(error) => {
                            warn!(%error, "recovery body did not parse; element left as sent");
                        }
                    }
                }
            }
            Ok(recovery) => {
                debug!(
                    status = recovery.status(),
                    "recovery fetch rejected; element left as sent"
                );
            }
            Err(error) => {
                warn!(%error, "recovery fetch failed; element left as sent");
            }
        }
        self.bus.emit(
            doc,
            node,
            SignalPayload::Error {
                method: Verb::Put,
                cause: SignalCause::Response(response.clone()),
            },
        );
        Ok(PutOutcome {
            node,
            response,
            replaced: false,
        })
    }

    /// Removes `node` after the server confirms the DELETE.
    ///
    /// On a success response the element is detached inside a transition
    /// boundary; a non-success response leaves the tree untouched and
    /// signals the failure. A transport failure is reported only through
    /// the signal and returns `Ok(None)`: the declarative delete path has
    /// no direct caller to re-raise to.
    ///
    /// # Errors
    ///
    /// [`ClientError::CapabilityNotGranted`] without a signal when the
    /// DELETE bit is absent; [`ClientError::Precondition`] (signaled, no
    /// request issued) on a detached element.
    pub async fn delete(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        transport: &dyn Transport,
        transitions: &mut dyn TransitionHost,
    ) -> Result<Option<Response>, ClientError> {
        self.require_capability(node, Verb::Delete)?;
        if doc.parent(node).is_none() {
            let error = ClientError::precondition("element must be attached to use DELETE");
            self.bus.emit(
                doc,
                node,
                SignalPayload::Error {
                    method: Verb::Delete,
                    cause: SignalCause::Error(error.clone()),
                },
            );
            return Err(error);
        }

        let mut request = Request::new(Verb::Delete, self.request_url(doc, node));
        request.headers = self.range_headers(doc, node);

        let response = match transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                self.bus.emit(
                    doc,
                    node,
                    SignalPayload::Error {
                        method: Verb::Delete,
                        cause: SignalCause::Error(ClientError::from(error)),
                    },
                );
                return Ok(None);
            }
        };

        if response.ok() {
            // Signal first: detaching destroys the bubbling path.
            self.bus.emit(
                doc,
                node,
                SignalPayload::Ok {
                    response: response.clone(),
                },
            );
            run_scoped(transitions, || doc.detach(node));
            self.revoke_capabilities(node);
        } else {
            self.bus.emit(
                doc,
                node,
                SignalPayload::Error {
                    method: Verb::Delete,
                    cause: SignalCause::Response(response.clone()),
                },
            );
        }
        Ok(Some(response))
    }
}
