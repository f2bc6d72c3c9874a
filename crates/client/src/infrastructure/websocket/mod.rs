//! WebSocket transport implementation

mod client;

pub use client::WebSocketTransport;
