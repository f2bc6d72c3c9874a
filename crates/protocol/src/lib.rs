//! wampkit Protocol - WAMP wire format shared by every part of the client
//!
//! This crate contains:
//! - WAMP message type codes (`MessageCode`)
//! - Message values for both directions (`ClientMessage`, `RouterMessage`)
//! - The JSON array codec (`encode`, `decode`)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json and thiserror
//! 2. **No session logic** - Pure data types and serialization
//! 3. **Strict decoding** - Arity and field types are validated per message shape

pub mod codec;
pub mod codes;
pub mod error;
pub mod messages;

pub use codec::{decode, decode_value, encode};
pub use codes::MessageCode;
pub use error::{ArityRule, CodecError};
pub use messages::{ClientMessage, Dict, Id, List, RouterMessage, CLIENT_ROLES};
