//! Transport port consumed by the session.
//!
//! The session never touches sockets directly: it opens a `Transport`, hands it a
//! `TransportHandler` for inbound frames, and pushes outbound text frames through
//! `send_text`.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::DEFAULT_PATH;

/// Errors raised by transport implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Failed to send frame: {0}")]
    Send(String),

    #[error("Transport is not connected")]
    NotConnected,
}

impl TransportError {
    pub fn connect(url: impl ToString, message: impl ToString) -> Self {
        Self::Connect {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: DEFAULT_PATH.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the WebSocket URL. A bare host gets the `ws://` scheme; an explicit
    /// `ws://` or `wss://` host keeps its scheme.
    pub fn url(&self) -> Result<Url, TransportError> {
        let base = if self.host.starts_with("ws://") || self.host.starts_with("wss://") {
            self.host.clone()
        } else {
            format!("ws://{}", self.host)
        };

        let mut url = Url::parse(&base).map_err(|e| TransportError::connect(&base, e))?;
        url.set_port(Some(self.port))
            .map_err(|_| TransportError::connect(&base, "host cannot carry a port"))?;
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        url.set_path(&path);
        Ok(url)
    }
}

/// Callbacks a transport invokes from its receive context.
pub trait TransportHandler: Send + Sync {
    /// A complete text frame arrived.
    fn on_message(&self, text: &str);

    /// The connection dropped without a local `close`.
    fn on_connection_lost(&self);
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection and start delivering frames to `handler`.
    async fn open(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<(), TransportError>;

    /// Send one text frame. Frames are written in call order.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Closing an already closed transport is a no-op.
    async fn close(&self);
}
