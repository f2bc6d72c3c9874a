//! Codec error types

use std::fmt;

use crate::codes::MessageCode;

/// How many fields a message shape allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityRule {
    Exactly(usize),
    AtLeast(usize),
}

impl fmt::Display for ArityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArityRule::Exactly(n) => write!(f, "exactly {}", n),
            ArityRule::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Errors raised while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("WebSocket received payload is not a valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("JSON payload is not a WAMP message array")]
    NotAnArray,

    #[error("JSON payload has no integer message type code")]
    MissingTypeCode,

    #[error("unknown WAMP message type code {0}")]
    UnknownCode(u64),

    #[error("{code} message is invalid: expected {expected} fields, got {actual}")]
    Arity {
        code: MessageCode,
        expected: ArityRule,
        actual: usize,
    },

    #[error("{code} message is invalid: field {index} is not {expected}")]
    FieldType {
        code: MessageCode,
        index: usize,
        expected: &'static str,
    },
}

impl CodecError {
    pub fn field(code: MessageCode, index: usize, expected: &'static str) -> Self {
        CodecError::FieldType {
            code,
            index,
            expected,
        }
    }
}
