//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding or encoding wire payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON body did not match the expected shape.
    #[error("malformed {context} payload: {source}")]
    Json {
        /// Which payload was being decoded.
        context: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Channel name does not follow the messenger naming scheme.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Event arrived on a channel that never carries it.
    #[error("event {event} is not delivered on channel {channel}")]
    UnexpectedEvent {
        /// Event name as received.
        event: String,
        /// Channel name as received.
        channel: String,
    },
}

impl ProtocolError {
    pub(crate) fn json(context: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Json { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_names_context() {
        let source = serde_json::from_str::<u64>("nope").unwrap_err();
        let err = ProtocolError::json("history page")(source);
        assert!(err.to_string().starts_with("malformed history page payload"));
    }
}
