//! Session lifecycle state and welcome-time auth info.

use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;
use wampkit_protocol::Dict;

use crate::error::ProtocolError;

/// Where a session is in its connect/join lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, never started
    Idle,
    /// Transport is opening
    Connecting,
    /// Transport open, no realm joined
    Connected,
    /// HELLO sent, waiting for WELCOME
    Joining,
    Joined,
    /// GOODBYE sent, waiting for the reply
    Closing,
    Closed,
    /// Transport lost, open failed, or a protocol violation under the abort policy
    Faulted,
}

impl SessionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Joining => 3,
            SessionState::Joined => 4,
            SessionState::Closing => 5,
            SessionState::Closed => 6,
            SessionState::Faulted => 7,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Joining,
            4 => SessionState::Joined,
            5 => SessionState::Closing,
            6 => SessionState::Closed,
            7 => SessionState::Faulted,
            _ => SessionState::Idle,
        }
    }
}

/// Atomic cell holding a `SessionState`.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Set `state` unless the session is already faulted.
    pub(crate) fn set_unless_faulted(&self, state: SessionState) {
        let faulted = SessionState::Faulted.to_u8();
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != faulted).then_some(state.to_u8())
            });
    }
}

/// Authentication details reported by the router in WELCOME.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    pub authmethod: String,
    pub authprovider: String,
    pub authid: String,
    pub authrole: String,
}

impl AuthInfo {
    /// Read the four auth fields from WELCOME details. Absent keys stay empty; a
    /// present key that is not a string is rejected.
    pub fn from_details(details: &Dict) -> Result<Self, ProtocolError> {
        let field = |key: &str| match details.get(key) {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ProtocolError::InvalidAuthInfo),
        };

        Ok(Self {
            authmethod: field("authmethod")?,
            authprovider: field("authprovider")?,
            authid: field("authid")?,
            authrole: field("authrole")?,
        })
    }
}

/// Login material for `join`. Only `method` and `authid` go on the wire; CHALLENGE is
/// rejected, so `signature` is never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub method: String,
    pub authid: String,
    pub signature: String,
}

impl Credentials {
    pub fn new(method: impl Into<String>, authid: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            authid: authid.into(),
            signature: String::new(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }
}
