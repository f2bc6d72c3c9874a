//! WAMP session
//!
//! A `Session` owns one router connection at a time and every request issued on it.
//! Callers enqueue from any task and get a `ResultHandle` back; the transport's receive
//! task resolves handles as replies arrive; `stop` resolves whatever is left.
//!
//! # Locking
//!
//! Each correlation table has its own std mutex. Only teardown holds several at once,
//! always in the order calls, subscribe requests, unsubscribe requests, active
//! subscriptions. No network I/O happens under any of them; sends are done by the
//! sender worker. Start and stop are serialized by a separate async lifecycle lock.

mod dispatcher;
mod outbound;
mod pending;
mod rpc;
mod state;
mod subscriptions;


use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use wampkit_protocol::{ClientMessage, Dict, Id, List};

use crate::config::{ClientConfig, ViolationPolicy, DEFAULT_PATH};
use crate::error::WampError;
use crate::infrastructure::WebSocketTransport;
use crate::ports::{Endpoint, Transport};
use crate::sync::lock;

use dispatcher::SessionLink;
use outbound::Outbound;
use pending::{result_channel, CorrelationTables, RequestIds, Resolver};
use state::StateCell;

pub use pending::{CallResult, ResultHandle};
pub use rpc::KWARGS_MESSAGE;
pub use state::{AuthInfo, Credentials, SessionState};
pub use subscriptions::{Event, EventHandler, Subscription};

/// Called when the connection drops without a local `stop`.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

pub const RECONNECT_REASON: &str = "connection closed by session reconnect";
pub const DESTRUCTION_REASON: &str = "connection closed by destruction of session";
pub(crate) const GOODBYE_REPLY_REASON: &str = "wamp.error.goodbye_and_out";
const JOIN_SUPERSEDED: &str = "join superseded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// WebSocket path appended to host and port
    pub path: String,
    pub violation_policy: ViolationPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.into(),
            violation_policy: ViolationPolicy::default(),
        }
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            path: config.path.clone(),
            violation_policy: config.violation_policy,
        }
    }
}

/// A WAMP caller/subscriber session.
///
/// Dropping a running session tears it down: pending handles resolve with
/// [`DESTRUCTION_REASON`] and the transport is closed on the current runtime.
pub struct Session {
    shared: Arc<SessionShared>,
}

pub(crate) struct SessionShared {
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    state: StateCell,
    running: AtomicBool,
    was_disconnected: AtomicBool,
    goodbye_sent: AtomicBool,
    session_id: AtomicU64,
    /// Bumped on every start; callbacks from older connections are ignored
    generation: AtomicU64,
    request_ids: RequestIds,
    auth_info: Mutex<AuthInfo>,
    on_disconnect: Mutex<Option<DisconnectHandler>>,
    join: Mutex<Option<Resolver<Id>>>,
    leave: Mutex<Option<Resolver<String>>>,
    tables: CorrelationTables,
    subscriptions: subscriptions::ActiveSubscriptions,
    outbound: Outbound,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                transport,
                options,
                state: StateCell::new(SessionState::Idle),
                running: AtomicBool::new(false),
                was_disconnected: AtomicBool::new(false),
                goodbye_sent: AtomicBool::new(false),
                session_id: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                request_ids: RequestIds::default(),
                auth_info: Mutex::new(AuthInfo::default()),
                on_disconnect: Mutex::new(None),
                join: Mutex::new(None),
                leave: Mutex::new(None),
                tables: CorrelationTables::default(),
                subscriptions: Default::default(),
                outbound: Outbound::default(),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// A session over the tokio-tungstenite WebSocket transport.
    pub fn websocket(options: SessionOptions) -> Self {
        Self::new(Arc::new(WebSocketTransport::new()), options)
    }

    /// Tear down any previous connection, open the transport and start the sender.
    pub async fn start(
        &self,
        host: &str,
        port: u16,
        on_disconnect: Option<DisconnectHandler>,
    ) -> Result<(), WampError> {
        self.shared.start(host, port, on_disconnect).await
    }

    /// Tear the connection down, resolving every pending handle with `reason`.
    /// Runs once per connection; later calls return immediately.
    pub async fn stop(&self, reason: &str) {
        self.shared.stop(reason).await
    }

    pub fn is_connected(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
            && !self.shared.was_disconnected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// The joined session id, or 0.
    pub fn session_id(&self) -> Id {
        self.shared.session_id.load(Ordering::SeqCst)
    }

    pub fn auth_info(&self) -> AuthInfo {
        lock(&self.shared.auth_info).clone()
    }

    /// Send HELLO for `realm`. A join already in flight is resolved as superseded.
    pub fn join(&self, realm: &str, credentials: Option<Credentials>) -> ResultHandle<Id> {
        self.shared.join(realm, credentials)
    }

    /// Send GOODBYE; the handle resolves with the router's reply reason.
    pub fn leave(&self, reason: &str) -> Result<ResultHandle<String>, WampError> {
        self.shared.leave(reason)
    }

    /// Call `procedure`. `kwargs` must be `null` or an object.
    pub fn call(
        &self,
        procedure: &str,
        args: List,
        kwargs: Value,
        options: Dict,
    ) -> Result<ResultHandle<CallResult>, WampError> {
        self.shared.call(procedure, args, kwargs, options)
    }

    pub fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        options: Dict,
    ) -> Result<ResultHandle<Subscription>, WampError> {
        self.shared.subscribe(topic, handler, options)
    }

    pub fn unsubscribe(&self, subscription: Id) -> Result<ResultHandle<()>, WampError> {
        self.shared.unsubscribe(subscription)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.teardown_on_drop();
    }
}

impl SessionShared {
    fn require_session(&self) -> Result<Id, WampError> {
        match self.session_id.load(Ordering::SeqCst) {
            0 => Err(WampError::NoSession),
            id => Ok(id),
        }
    }

    fn is_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn start(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        on_disconnect: Option<DisconnectHandler>,
    ) -> Result<(), WampError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked(RECONNECT_REASON).await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // A sender-triggered teardown may not have closed the old connection yet.
        self.transport.close().await;

        *lock(&self.on_disconnect) = on_disconnect;
        *lock(&self.auth_info) = AuthInfo::default();
        self.was_disconnected.store(false, Ordering::SeqCst);
        self.goodbye_sent.store(false, Ordering::SeqCst);
        self.state.set(SessionState::Connecting);

        let endpoint = Endpoint::new(host, port).with_path(self.options.path.clone());
        let link = Arc::new(SessionLink {
            session: Arc::downgrade(self),
            generation,
        });
        if let Err(e) = self.transport.open(&endpoint, link).await {
            tracing::warn!(host, port, error = %e, "Failed to open WAMP transport");
            self.state.set(SessionState::Faulted);
            return Err(WampError::connection(e));
        }

        let reader = self.outbound.open();
        let worker = tokio::spawn(outbound::run_sender(
            Arc::downgrade(self),
            Arc::clone(&self.transport),
            generation,
            reader,
        ));
        self.outbound.set_worker(worker);

        self.running.store(true, Ordering::SeqCst);
        self.state.set(SessionState::Connected);
        tracing::info!(host, port, generation, "WAMP session started");
        Ok(())
    }

    async fn stop(&self, reason: &str) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked(reason).await;
    }

    /// Stop only if `generation` is still the current connection.
    async fn stop_connection(&self, generation: u64, reason: &str) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_generation(generation) {
            tracing::debug!(generation, reason, "Skipping stop for a replaced connection");
            return;
        }
        self.stop_locked(reason).await;
    }

    /// Full teardown; the caller holds the lifecycle lock.
    async fn stop_locked(&self, reason: &str) {
        if !self.begin_stop() {
            return;
        }
        tracing::info!(reason, "Stopping WAMP session");

        if let Some(worker) = self.outbound.halt() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Sender worker ended abnormally");
            }
        }
        self.transport.close().await;
        self.finish_stop(reason);
    }

    /// Teardown after a failed send, running on the sender worker itself.
    async fn stop_from_sender(&self, generation: u64, reason: &str) {
        if !self.begin_stop() {
            return;
        }
        tracing::warn!(reason, "Stopping WAMP session after send failure");
        self.state.set(SessionState::Faulted);

        // Joining ourselves would never finish; let the handle go.
        drop(self.outbound.halt());
        self.finish_stop(reason);

        let _lifecycle = self.lifecycle.lock().await;
        if self.is_generation(generation) {
            self.transport.close().await;
        }
    }

    fn teardown_on_drop(self: &Arc<Self>) {
        if !self.begin_stop() {
            return;
        }
        tracing::debug!("Session dropped while running");

        drop(self.outbound.halt());
        self.finish_stop(DESTRUCTION_REASON);

        let generation = self.generation.load(Ordering::SeqCst);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = Arc::clone(self);
                runtime.spawn(async move {
                    let _lifecycle = session.lifecycle.lock().await;
                    if session.is_generation(generation) {
                        session.transport.close().await;
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Session dropped outside a tokio runtime; transport not closed");
            }
        }
    }

    /// Claim the teardown for the current connection.
    fn begin_stop(&self) -> bool {
        self.running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Resolve every outstanding handle with `reason` and forget the session.
    fn finish_stop(&self, reason: &str) {
        let aborted = self.tables.abort_all(reason, &self.subscriptions);

        if let Some(resolver) = lock(&self.join).take() {
            resolver.resolve(Err(WampError::connection(reason)));
        }
        if let Some(resolver) = lock(&self.leave).take() {
            resolver.resolve(Err(WampError::connection(reason)));
        }

        self.session_id.store(0, Ordering::SeqCst);
        self.goodbye_sent.store(false, Ordering::SeqCst);
        self.state.set_unless_faulted(SessionState::Closed);

        if aborted > 0 {
            tracing::debug!(aborted, reason, "Aborted pending requests");
        }
    }

    fn on_connection_lost(&self, generation: u64) {
        if !self.is_generation(generation) || !self.running.load(Ordering::SeqCst) {
            return;
        }
        if self.was_disconnected.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(generation, "Connection to WAMP router lost");
        self.state.set(SessionState::Faulted);

        // Teardown is left to the owner's next start or stop.
        let handler = lock(&self.on_disconnect).clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn join(&self, realm: &str, credentials: Option<Credentials>) -> ResultHandle<Id> {
        let credentials = credentials.unwrap_or_default();
        let hello = ClientMessage::hello(
            realm,
            Some((credentials.method.as_str(), credentials.authid.as_str())),
        );
        let (resolver, handle) = result_channel(None);

        let mut slot = lock(&self.join);
        if let Some(previous) = slot.replace(resolver) {
            previous.resolve(Err(WampError::connection(JOIN_SUPERSEDED)));
        }

        if let Err(e) = self.outbound.enqueue(&hello) {
            if let Some(resolver) = slot.take() {
                resolver.resolve(Err(e));
            }
            return handle;
        }
        self.state.set_unless_faulted(SessionState::Joining);
        drop(slot);

        tracing::debug!(realm, authid = %credentials.authid, "HELLO enqueued");
        handle
    }

    fn leave(&self, reason: &str) -> Result<ResultHandle<String>, WampError> {
        let mut slot = lock(&self.leave);
        let session_id = self.session_id.swap(0, Ordering::SeqCst);
        if session_id == 0 {
            return Err(WampError::NoSession);
        }

        let (resolver, handle) = result_channel(None);
        *slot = Some(resolver);
        self.goodbye_sent.store(true, Ordering::SeqCst);

        let goodbye = ClientMessage::Goodbye {
            details: Dict::new(),
            reason: reason.to_string(),
        };
        if let Err(e) = self.outbound.enqueue(&goodbye) {
            slot.take();
            self.goodbye_sent.store(false, Ordering::SeqCst);
            // Still joined; put the id back unless something else claimed the slot.
            let _ = self.session_id.compare_exchange(
                0,
                session_id,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(e);
        }

        self.state.set_unless_faulted(SessionState::Closing);
        tracing::debug!(reason, active_subscriptions = self.subscriptions.len(), "GOODBYE enqueued");
        Ok(handle)
    }
}
