//! Infrastructure adapters implementing the ports.

pub mod websocket;

pub use websocket::WebSocketTransport;
