//! wampkit client library.
//!
//! A WAMP caller/subscriber session over a WebSocket transport.
//!
//! ## Structure
//!
//! - `session/` - Session lifecycle, request correlation, subscriptions, dispatch
//! - `ports/` - Transport port the session is written against
//! - `infrastructure/` - tokio-tungstenite implementation of the transport port
//! - `client` - Request/response facade with timeouts
//! - `config` - Environment-driven configuration

pub mod client;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod ports;
pub mod session;

mod sync;

/// Loopback transport and mocks for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::Client;
pub use config::{ClientConfig, ViolationPolicy};
pub use error::{ProtocolError, ServerError, WampError};
pub use session::{
    AuthInfo, CallResult, Credentials, DisconnectHandler, Event, EventHandler, ResultHandle,
    Session, SessionOptions, SessionState, Subscription,
};
