//! WebSocket transport using tokio-tungstenite

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::ports::{Endpoint, Transport, TransportError, TransportHandler};
use crate::sync::lock;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Text-frame WebSocket connection to a WAMP router.
///
/// The read half runs on its own task and feeds the handler; the write half sits
/// behind a tokio mutex so `send_text` calls are written one at a time.
pub struct WebSocketTransport {
    writer: Mutex<Option<WsSink>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Set by `close` so the reader does not report a local close as a loss
    intentional_close: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(None),
            reader: std::sync::Mutex::new(None),
            intentional_close: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<(), TransportError> {
        let url = endpoint.url()?;

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Failed to connect to WAMP router");
            TransportError::connect(&url, e)
        })?;
        tracing::info!(url = %url, "Connected to WAMP router");

        let (write, mut read) = ws_stream.split();
        *self.writer.lock().await = Some(write);
        self.intentional_close.store(false, Ordering::SeqCst);

        let intentional_close = Arc::clone(&self.intentional_close);
        let read_handle = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => handler.on_message(&text),
                    Ok(Message::Close(_)) => {
                        tracing::info!("Router closed connection");
                        break;
                    }
                    Ok(Message::Binary(_)) => {
                        tracing::warn!("Ignoring binary frame; only JSON text frames are supported");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            if !intentional_close.load(Ordering::SeqCst) {
                handler.on_connection_lost();
            }
        });

        if let Some(previous) = lock(&self.reader).replace(read_handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) {
        self.intentional_close.store(true, Ordering::SeqCst);

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "WebSocket close handshake failed");
            }
        }

        let reader = lock(&self.reader).take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_open_is_not_connected() {
        let transport = WebSocketTransport::new();
        let err = transport.send_text("[1]".into()).await.unwrap_err();
        assert_eq!(err, TransportError::NotConnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = WebSocketTransport::new();
        transport.close().await;
        transport.close().await;
        assert!(transport.intentional_close.load(Ordering::SeqCst));
    }
}
