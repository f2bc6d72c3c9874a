//! Outbound queue and the sender worker
//!
//! Producers encode and enqueue from any task; one worker per connection drains the
//! queue in enqueue order and owns every `Transport::send_text` call, so a slow network
//! write never blocks a caller holding a correlation-table lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use wampkit_protocol::{encode, ClientMessage};

use crate::error::WampError;
use crate::ports::Transport;
use crate::session::SessionShared;
use crate::sync::lock;

/// One encoded frame plus its position in the queue.
#[derive(Debug)]
pub(crate) struct OutboundMessage {
    pub(crate) sequence: u64,
    pub(crate) payload: String,
}

/// Lifecycle of the sender worker for the current connection.
#[derive(Debug, Default)]
enum SenderState {
    #[default]
    NotStarted,
    Running(JoinHandle<()>),
    Stopped,
}

struct QueueWriter {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    shutdown: watch::Sender<bool>,
}

/// Receiving side handed to a new worker.
pub(crate) struct QueueReader {
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown: watch::Receiver<bool>,
}

#[derive(Default)]
pub(crate) struct Outbound {
    writer: Mutex<Option<QueueWriter>>,
    worker: Mutex<SenderState>,
    sequence: AtomicU64,
}

impl Outbound {
    /// Replace the queue with a fresh one for a new connection.
    pub(crate) fn open(&self) -> QueueReader {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *lock(&self.writer) = Some(QueueWriter {
            tx,
            shutdown: shutdown_tx,
        });
        QueueReader {
            rx,
            shutdown: shutdown_rx,
        }
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        *lock(&self.worker) = SenderState::Running(handle);
    }

    /// Encode and append a message. Fails when no connection is running.
    pub(crate) fn enqueue(&self, message: &ClientMessage) -> Result<u64, WampError> {
        let payload = encode(message);

        let writer = lock(&self.writer);
        let Some(writer) = writer.as_ref() else {
            return Err(WampError::connection("session is not running"));
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        writer
            .tx
            .send(OutboundMessage { sequence, payload })
            .map_err(|_| WampError::connection("sender worker has stopped"))?;

        tracing::trace!(sequence, code = %message.code(), "Enqueued outbound message");
        Ok(sequence)
    }

    /// Close the queue, wake the worker and mark it stopped.
    ///
    /// Returns the worker's handle when it was running so the caller can join it. A
    /// caller running on the worker itself drops the handle instead.
    pub(crate) fn halt(&self) -> Option<JoinHandle<()>> {
        if let Some(writer) = lock(&self.writer).take() {
            let _ = writer.shutdown.send(true);
        }

        match std::mem::replace(&mut *lock(&self.worker), SenderState::Stopped) {
            SenderState::Running(handle) => Some(handle),
            SenderState::NotStarted | SenderState::Stopped => None,
        }
    }
}

/// Drain `reader` into the transport until shutdown or a send failure.
///
/// A failed send tears the whole session down from here; `generation` identifies the
/// connection this worker belongs to.
pub(crate) async fn run_sender(
    session: Weak<SessionShared>,
    transport: Arc<dyn Transport>,
    generation: u64,
    reader: QueueReader,
) {
    let QueueReader {
        mut rx,
        mut shutdown,
    } = reader;

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let sequence = message.sequence;
        if let Err(e) = transport.send_text(message.payload).await {
            tracing::error!(sequence, error = %e, "Failed to send WAMP message");
            if let Some(session) = session.upgrade() {
                session.stop_from_sender(generation, &e.to_string()).await;
            }
            return;
        }
        tracing::trace!(sequence, "Sent outbound message");
    }

    let mut discarded = 0usize;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::debug!(discarded, "Discarded queued outbound messages on shutdown");
    }
}
