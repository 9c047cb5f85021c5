//! Client error types.

use thiserror::Error;
use threadline_core::{ConversationError, StoreError};
use threadline_proto::ProtocolError;

use crate::RequestId;

/// Errors from [`crate::Client::handle`].
///
/// All of them reject a single event and leave the client usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Message store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Conversation list rejected the operation.
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// Operation needs an open conversation.
    #[error("no conversation is open")]
    NoActiveConversation,

    /// Event requires a started session.
    #[error("session not started")]
    NotStarted,
}

/// Failure of a request or push subscription, reported back to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established or broke mid-request.
    #[error("network error: {reason}")]
    Network {
        /// Failure description.
        reason: String,
    },

    /// Server answered with a non-success status.
    #[error("request {request_id} failed with status {status}")]
    Status {
        /// Request that failed.
        request_id: RequestId,
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not match the contract.
    #[error("malformed response: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },
}

impl TransportError {
    /// Whether retrying later could succeed.
    ///
    /// The engine never retries on its own; this feeds notices and logs.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(error: ProtocolError) -> Self {
        Self::Decode { reason: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        let status = |status| TransportError::Status { request_id: RequestId::new(1), status };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(422).is_transient());
        assert!(TransportError::Network { reason: "reset".into() }.is_transient());
        assert!(!TransportError::Decode { reason: "eof".into() }.is_transient());
    }
}
