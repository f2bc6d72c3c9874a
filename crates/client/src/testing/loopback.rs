//! In-memory transport that records outbound frames and lets tests play the router.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{Endpoint, Transport, TransportError, TransportHandler};
use crate::sync::lock;

const WAIT_STEP: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct LoopbackTransport {
    handler: Mutex<Option<Arc<dyn TransportHandler>>>,
    endpoints: Mutex<Vec<Endpoint>>,
    sent: Mutex<Vec<String>>,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    closes: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Endpoints passed to successful `open` calls, oldest first.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        lock(&self.endpoints).clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Frames sent so far, parsed as JSON.
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.sent)
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Wait until at least `count` frames were sent, then return all of them.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while lock(&self.sent).len() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(WAIT_STEP).await;
        }
        self.sent()
    }

    /// Feed a frame to the session as if the router sent it.
    pub fn deliver(&self, frame: Value) {
        self.deliver_text(&frame.to_string());
    }

    pub fn deliver_text(&self, text: &str) {
        let handler = lock(&self.handler).clone();
        if let Some(handler) = handler {
            handler.on_message(text);
        }
    }

    /// Drop the connection from the router side.
    pub fn lose_connection(&self) {
        let handler = lock(&self.handler).take();
        if let Some(handler) = handler {
            handler.on_connection_lost();
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<(), TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::connect(
                format!("{}:{}", endpoint.host, endpoint.port),
                "connection refused",
            ));
        }
        lock(&self.endpoints).push(endpoint.clone());
        *lock(&self.handler) = Some(handler);
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if lock(&self.handler).is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Send("loopback send failure".into()));
        }
        lock(&self.sent).push(text);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        lock(&self.handler).take();
    }
}
