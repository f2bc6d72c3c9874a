//! WAMP message type codes.
//!
//! Every message on the wire is a JSON array whose first element is one of these codes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Numeric message type codes from the WAMP basic profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum MessageCode {
    Hello,
    Welcome,
    Abort,
    Challenge,
    Authenticate,
    Goodbye,
    Heartbeat,
    Error,
    Publish,
    Published,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Event,
    Call,
    Cancel,
    Result,
    Register,
    Registered,
    Unregister,
    Unregistered,
    Invocation,
    Interrupt,
    Yield,
}

impl MessageCode {
    /// Convert to the integer sent on the wire.
    pub fn to_u64(self) -> u64 {
        match self {
            MessageCode::Hello => 1,
            MessageCode::Welcome => 2,
            MessageCode::Abort => 3,
            MessageCode::Challenge => 4,
            MessageCode::Authenticate => 5,
            MessageCode::Goodbye => 6,
            MessageCode::Heartbeat => 7,
            MessageCode::Error => 8,
            MessageCode::Publish => 16,
            MessageCode::Published => 17,
            MessageCode::Subscribe => 32,
            MessageCode::Subscribed => 33,
            MessageCode::Unsubscribe => 34,
            MessageCode::Unsubscribed => 35,
            MessageCode::Event => 36,
            MessageCode::Call => 48,
            MessageCode::Cancel => 49,
            MessageCode::Result => 50,
            MessageCode::Register => 64,
            MessageCode::Registered => 65,
            MessageCode::Unregister => 66,
            MessageCode::Unregistered => 67,
            MessageCode::Invocation => 68,
            MessageCode::Interrupt => 69,
            MessageCode::Yield => 70,
        }
    }

    /// Convert from the integer received on the wire.
    pub fn from_u64(v: u64) -> Option<Self> {
        let code = match v {
            1 => MessageCode::Hello,
            2 => MessageCode::Welcome,
            3 => MessageCode::Abort,
            4 => MessageCode::Challenge,
            5 => MessageCode::Authenticate,
            6 => MessageCode::Goodbye,
            7 => MessageCode::Heartbeat,
            8 => MessageCode::Error,
            16 => MessageCode::Publish,
            17 => MessageCode::Published,
            32 => MessageCode::Subscribe,
            33 => MessageCode::Subscribed,
            34 => MessageCode::Unsubscribe,
            35 => MessageCode::Unsubscribed,
            36 => MessageCode::Event,
            48 => MessageCode::Call,
            49 => MessageCode::Cancel,
            50 => MessageCode::Result,
            64 => MessageCode::Register,
            65 => MessageCode::Registered,
            66 => MessageCode::Unregister,
            67 => MessageCode::Unregistered,
            68 => MessageCode::Invocation,
            69 => MessageCode::Interrupt,
            70 => MessageCode::Yield,
            _ => return None,
        };
        Some(code)
    }

    /// Codes a router never legitimately sends to a client-only peer.
    pub fn is_client_to_router_only(self) -> bool {
        matches!(
            self,
            MessageCode::Hello
                | MessageCode::Authenticate
                | MessageCode::Publish
                | MessageCode::Subscribe
                | MessageCode::Unsubscribe
                | MessageCode::Call
                | MessageCode::Cancel
                | MessageCode::Register
                | MessageCode::Unregister
                | MessageCode::Yield
        )
    }
}

impl From<MessageCode> for u64 {
    fn from(code: MessageCode) -> Self {
        code.to_u64()
    }
}

impl TryFrom<u64> for MessageCode {
    type Error = CodecError;

    fn try_from(v: u64) -> Result<Self, CodecError> {
        MessageCode::from_u64(v).ok_or(CodecError::UnknownCode(v))
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageCode::Hello => "HELLO",
            MessageCode::Welcome => "WELCOME",
            MessageCode::Abort => "ABORT",
            MessageCode::Challenge => "CHALLENGE",
            MessageCode::Authenticate => "AUTHENTICATE",
            MessageCode::Goodbye => "GOODBYE",
            MessageCode::Heartbeat => "HEARTBEAT",
            MessageCode::Error => "ERROR",
            MessageCode::Publish => "PUBLISH",
            MessageCode::Published => "PUBLISHED",
            MessageCode::Subscribe => "SUBSCRIBE",
            MessageCode::Subscribed => "SUBSCRIBED",
            MessageCode::Unsubscribe => "UNSUBSCRIBE",
            MessageCode::Unsubscribed => "UNSUBSCRIBED",
            MessageCode::Event => "EVENT",
            MessageCode::Call => "CALL",
            MessageCode::Cancel => "CANCEL",
            MessageCode::Result => "RESULT",
            MessageCode::Register => "REGISTER",
            MessageCode::Registered => "REGISTERED",
            MessageCode::Unregister => "UNREGISTER",
            MessageCode::Unregistered => "UNREGISTERED",
            MessageCode::Invocation => "INVOCATION",
            MessageCode::Interrupt => "INTERRUPT",
            MessageCode::Yield => "YIELD",
        };
        f.write_str(name)
    }
}
