//! Error taxonomy for verb operations and discovery.

use thiserror::Error;

use domcap_dom::MarkupError;

use crate::transport::{TransportError, Verb};

/// Errors surfaced by verb operations.
///
/// Discovery failures never surface here — absent or partial discovery is
/// an expected steady state, so transport failures, non-success responses,
/// and malformed discovery shapes (bad multipart boundary, missing
/// `Allow` / `Content-Range`) are all swallowed at debug level during
/// negotiation rather than raised. Every variant below is dual-reported
/// when raised from a verb operation: a bubbling error signal for
/// declarative observers, and the returned `Err` for the direct caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The transport failed to complete the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response body did not parse to exactly one node.
    #[error("failed to parse response markup: {0}")]
    Parse(#[from] MarkupError),

    /// The operation's structural precondition does not hold (for
    /// example, DELETE or PUT on a detached element).
    #[error("precondition failed: {detail}")]
    Precondition {
        /// The violated precondition.
        detail: String,
    },

    /// The caller passed a payload of an unsupported shape.
    #[error("invalid argument: {detail}")]
    InvalidArgument {
        /// What was wrong, naming the accepted forms.
        detail: String,
    },

    /// The verb was invoked on an element that was never granted it.
    ///
    /// Capability dispatch is data-driven; this is the explicit analogue
    /// of calling an operation that was never attached.
    #[error("capability {verb} not granted for element")]
    CapabilityNotGranted {
        /// The verb that was attempted.
        verb: Verb,
    },
}

impl ClientError {
    /// Shorthand for a precondition failure.
    #[must_use]
    pub fn precondition(detail: impl Into<String>) -> Self {
        Self::Precondition {
            detail: detail.into(),
        }
    }

    /// Shorthand for an invalid-argument failure.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = ClientError::CapabilityNotGranted { verb: Verb::Put };
        assert_eq!(err.to_string(), "capability PUT not granted for element");

        let err = ClientError::precondition("element must have a parent to use DELETE");
        assert!(err.to_string().contains("must have a parent"));
    }

    #[test]
    fn transport_errors_convert_transparently() {
        let err: ClientError = TransportError::new("dns failure").into();
        assert_eq!(err.to_string(), "request failed: dns failure");
    }
}
