//! Error types for session and client operations.

use std::fmt;

use serde_json::Value;
use wampkit_protocol::{CodecError, Dict, Id, List, MessageCode};

/// Message used when an operation needs a joined session.
pub const NO_SESSION_MESSAGE: &str = "session not joined";

/// Message used when a caller-side wait expires.
pub const TIMEOUT_MESSAGE: &str = "Failed to receive WAAPI message in time.";

/// An ERROR reply from the router, kept with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError {
    pub uri: String,
    pub args: List,
    pub kwargs: Dict,
}

impl ServerError {
    pub fn new(uri: impl Into<String>, args: List, kwargs: Dict) -> Self {
        Self {
            uri: uri.into(),
            args,
            kwargs,
        }
    }

    /// The keyword payload with the error URI merged in under `uri`.
    pub fn to_document(&self) -> Value {
        let mut doc = self.kwargs.clone();
        doc.insert("uri".into(), Value::String(self.uri.clone()));
        Value::Object(doc)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kwargs.get("message").and_then(Value::as_str) {
            Some(message) => write!(f, "{}: {}", self.uri, message),
            None => write!(f, "{}", self.uri),
        }
    }
}

/// A message the router should not have sent in the current session state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{0}")]
    Malformed(String),

    #[error("{0} message is not expected by a caller/subscriber")]
    UnexpectedMessage(MessageCode),

    #[error("bogus {code} message for non-pending request ID {request}")]
    UnknownRequest { code: MessageCode, request: Id },

    #[error("{0} received and no session established")]
    NoSession(MessageCode),

    #[error("unable to respond to auth method {0}")]
    UnsupportedAuth(String),

    #[error("authmethod is invalid")]
    InvalidAuthInfo,

    #[error("ERROR not handled for request type {0}")]
    UnhandledError(u64),
}

impl From<CodecError> for ProtocolError {
    fn from(e: CodecError) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

/// Errors surfaced to session and client callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WampError {
    /// No WAMP session is established.
    #[error("session not joined")]
    NoSession,

    /// The connection was closed or lost before a reply arrived.
    #[error("{reason}")]
    Connection { reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The router answered with ERROR or ABORT.
    #[error("{0}")]
    Server(ServerError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Failed to receive WAAPI message in time.")]
    Timeout,
}

impl WampError {
    pub fn connection(reason: impl ToString) -> Self {
        Self::Connection {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_argument(message: impl ToString) -> Self {
        Self::InvalidArgument(message.to_string())
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Render the error as the JSON document handed to callers.
    ///
    /// Router errors keep their keyword payload plus `uri`; everything else is
    /// `{"message": ...}`.
    pub fn to_document(&self) -> Value {
        match self {
            WampError::Server(server) => server.to_document(),
            other => {
                let mut doc = Dict::new();
                doc.insert("message".into(), Value::String(other.to_string()));
                Value::Object(doc)
            }
        }
    }
}

impl From<ServerError> for WampError {
    fn from(e: ServerError) -> Self {
        WampError::Server(e)
    }
}
