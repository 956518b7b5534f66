//! # Error Taxonomies
//!
//! Every fallible path in the engine reports one of these enums. Outbound calls
//! never panic or propagate transport errors directly: they are folded into a
//! [`RequestFailure`] the caller can branch on.

use thiserror::Error;

use crate::models::events::EventKind;

/// Outcome of a failed outbound HTTP call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// No response arrived within the configured request timeout.
    #[error("request timed out")]
    Timeout,

    /// The credential was rejected twice in a row; the session has been torn down.
    #[error("session is not authorized")]
    Unauthorized,

    /// The server refused the request (HTTP 403). Never retried.
    #[error("access forbidden")]
    Forbidden,

    /// Any other non-2xx status, or a 2xx body without the success marker.
    #[error("server error (status {0})")]
    ServerError(u16),

    /// Network-level failure or a non-JSON body on a JSON endpoint.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The body was JSON with the success marker but not the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl RequestFailure {
    /// A short status line suitable for showing to an operator.
    pub fn user_message(&self) -> String {
        match self {
            RequestFailure::Timeout => "The server took too long to respond. Try again.".to_string(),
            RequestFailure::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            RequestFailure::Forbidden => "You do not have permission to do that.".to_string(),
            RequestFailure::ServerError(code) => format!("The server rejected the request (code {}).", code),
            RequestFailure::Unreachable(_) => "Cannot reach the server. Check the connection.".to_string(),
            RequestFailure::Malformed(_) => "The server sent an unexpected response.".to_string(),
        }
    }

    /// True only when the server could not be reached at all. A timeout is a
    /// separate case and answers false.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RequestFailure::Unreachable(_))
    }
}

/// Result alias for outbound calls.
pub type CallResult<T> = Result<T, RequestFailure>;

/// Failures of the push channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The endpoint could not be reached or refused the upgrade.
    #[error("push connect failed: {0}")]
    Connect(String),

    /// The request for the upgrade could not be built.
    #[error("push handshake failed: {0}")]
    Handshake(String),

    /// Reading from an established channel failed.
    #[error("push transport error: {0}")]
    Transport(String),

    /// The remote side closed the channel or went silent.
    #[error("push channel closed")]
    Closed,
}

/// Reasons a push frame did not reach a state holder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The frame named an event this engine does not consume.
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    /// The frame could not be decoded into its kind's payload.
    #[error("malformed {kind:?} payload: {reason}")]
    Malformed {
        /// Kind the frame claimed to be.
        kind: EventKind,
        /// Decoder message.
        reason: String,
    },

    /// The frame was not a JSON envelope.
    #[error("undecodable push frame: {0}")]
    BadFrame(String),

    /// A known kind arrived but no sink is registered for it.
    #[error("no sink registered for {0:?}")]
    NoRoute(EventKind),
}

/// Failures loading an [`EngineConfig`](crate::configs::EngineConfig) from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid JSON for the config shape.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_distinct() {
        let all = [
            RequestFailure::Timeout,
            RequestFailure::Unauthorized,
            RequestFailure::Forbidden,
            RequestFailure::ServerError(500),
            RequestFailure::Unreachable("refused".into()),
            RequestFailure::Malformed("missing field".into()),
        ];
        let mut messages: Vec<String> = all.iter().map(|f| f.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
        assert!(RequestFailure::ServerError(502).user_message().contains("502"));
    }

    #[test]
    fn test_timeout_is_not_unreachable() {
        assert!(RequestFailure::Unreachable("x".into()).is_unreachable());
        assert!(!RequestFailure::Timeout.is_unreachable());
        assert!(!RequestFailure::Forbidden.is_unreachable());
        assert!(!RequestFailure::ServerError(401).is_unreachable());
    }
}
