//! Request/reply correlation
//!
//! Every outbound request gets a fresh id and an entry in exactly one of three tables
//! (calls, subscribe requests, unsubscribe requests). The caller holds the matching
//! `ResultHandle`; the dispatcher resolves it from the reply, and `stop` resolves whatever
//! is left with a connection error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use wampkit_protocol::{Dict, Id, List};

use crate::error::WampError;
use crate::session::subscriptions::{ActiveSubscriptions, EventHandler, Subscription};
use crate::sync::lock;

const ABANDONED: &str = "result handle abandoned without a reply";

// =============================================================================
// Result handles
// =============================================================================

/// Write-once slot for the outcome of one request.
///
/// Produced when the request is enqueued and resolved exactly once: by the reply, by a
/// router error, or by session teardown.
#[derive(Debug)]
pub struct ResultHandle<T> {
    request_id: Option<Id>,
    rx: oneshot::Receiver<Result<T, WampError>>,
}

/// Sending half of a `ResultHandle`.
#[derive(Debug)]
pub(crate) struct Resolver<T>(oneshot::Sender<Result<T, WampError>>);

impl<T> Resolver<T> {
    /// Returns false when the caller already dropped its handle.
    pub(crate) fn resolve(self, result: Result<T, WampError>) -> bool {
        self.0.send(result).is_ok()
    }
}

pub(crate) fn result_channel<T>(request_id: Option<Id>) -> (Resolver<T>, ResultHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver(tx), ResultHandle { request_id, rx })
}

impl<T> ResultHandle<T> {
    /// A handle that is already resolved.
    pub fn resolved(result: Result<T, WampError>) -> Self {
        let (resolver, handle) = result_channel(None);
        resolver.resolve(result);
        handle
    }

    /// The request id this handle correlates to, if the request was sent.
    pub fn request_id(&self) -> Option<Id> {
        self.request_id
    }

    pub async fn wait(self) -> Result<T, WampError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(WampError::connection(ABANDONED)))
    }

    /// Wait at most `timeout`. Expiry leaves the request pending on the session; it is
    /// still resolved (and discarded) when the reply or teardown arrives.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T, WampError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(WampError::Timeout),
        }
    }

    /// Block the current thread until resolved. Must not be called from inside an
    /// async runtime worker.
    pub fn blocking_wait(self) -> Result<T, WampError> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(WampError::connection(ABANDONED)))
    }

    /// Non-blocking poll. `None` while the request is still pending.
    pub fn try_take(&mut self) -> Option<Result<T, WampError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(WampError::connection(ABANDONED))),
        }
    }
}

// =============================================================================
// Reply payloads
// =============================================================================

/// Payload of a RESULT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResult {
    pub args: List,
    pub kwargs: Dict,
}

impl CallResult {
    /// Collapse to one keyed document: the keyword payload when present, otherwise the
    /// positional payload keyed by index (`{"0": ...}`), otherwise `{}`.
    pub fn into_value(self) -> Value {
        if !self.kwargs.is_empty() {
            return Value::Object(self.kwargs);
        }

        let indexed: Dict = self
            .args
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        Value::Object(indexed)
    }
}

// =============================================================================
// Correlation tables
// =============================================================================

/// Monotonic request id source. The first id handed out is 1.
#[derive(Debug, Default)]
pub(crate) struct RequestIds(AtomicU64);

impl RequestIds {
    pub(crate) fn next(&self) -> Id {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Pending request tracker keyed by request id
pub(crate) struct PendingTable<E> {
    inner: HashMap<Id, E>,
}

impl<E> Default for PendingTable<E> {
    fn default() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }
}

impl<E> PendingTable<E> {
    pub(crate) fn insert(&mut self, request_id: Id, entry: E) {
        self.inner.insert(request_id, entry);
    }

    /// Remove and return the entry for `request_id`.
    pub(crate) fn take(&mut self, request_id: Id) -> Option<E> {
        self.inner.remove(&request_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (Id, E)> + '_ {
        self.inner.drain()
    }
}

pub(crate) type PendingCall = Resolver<CallResult>;

pub(crate) struct PendingSubscribe {
    pub(crate) topic: String,
    pub(crate) handler: EventHandler,
    pub(crate) resolver: Resolver<Subscription>,
}

pub(crate) struct PendingUnsubscribe {
    pub(crate) subscription: Id,
    pub(crate) resolver: Resolver<()>,
}

/// The three request tables, each behind its own lock.
///
/// Whenever more than one is held the order is calls, subscribes, unsubscribes, then
/// the active-subscription table.
#[derive(Default)]
pub(crate) struct CorrelationTables {
    pub(crate) calls: Mutex<PendingTable<PendingCall>>,
    pub(crate) subscribes: Mutex<PendingTable<PendingSubscribe>>,
    pub(crate) unsubscribes: Mutex<PendingTable<PendingUnsubscribe>>,
}

impl CorrelationTables {
    /// Resolve every pending request with a connection error carrying `reason`, then
    /// empty all tables including `active`. Returns how many requests were aborted.
    pub(crate) fn abort_all(&self, reason: &str, active: &ActiveSubscriptions) -> usize {
        let mut calls = lock(&self.calls);
        let mut subscribes = lock(&self.subscribes);
        let mut unsubscribes = lock(&self.unsubscribes);
        let mut handlers = active.lock_table();

        let mut aborted = 0;
        for (_, resolver) in calls.drain() {
            resolver.resolve(Err(WampError::connection(reason)));
            aborted += 1;
        }
        for (_, pending) in subscribes.drain() {
            pending.resolver.resolve(Err(WampError::connection(reason)));
            aborted += 1;
        }
        for (_, pending) in unsubscribes.drain() {
            pending.resolver.resolve(Err(WampError::connection(reason)));
            aborted += 1;
        }
        handlers.clear();

        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_request_ids_start_at_one_and_increase() {
        let ids = RequestIds::default();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn test_into_value_prefers_kwargs() {
        let mut kwargs = Dict::new();
        kwargs.insert("id".into(), json!("{abc}"));
        let result = CallResult {
            args: vec![json!("ignored")],
            kwargs,
        };
        assert_eq!(result.into_value(), json!({"id": "{abc}"}));
    }

    #[test]
    fn test_into_value_keys_args_by_index() {
        let result = CallResult {
            args: vec![json!("a"), json!(2)],
            kwargs: Dict::new(),
        };
        assert_eq!(result.into_value(), json!({"0": "a", "1": 2}));
        assert_eq!(CallResult::default().into_value(), json!({}));
    }

    #[tokio::test]
    async fn test_handle_resolves_once() {
        let (resolver, handle) = result_channel::<u64>(Some(4));
        assert_eq!(handle.request_id(), Some(4));
        assert!(resolver.resolve(Ok(9)));
        assert_eq!(handle.wait().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_wait_timeout_expires() {
        let (_resolver, handle) = result_channel::<u64>(None);
        let err = handle
            .wait_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WampError::Timeout));
    }

    #[tokio::test]
    async fn test_dropped_resolver_reports_connection_error() {
        let (resolver, handle) = result_channel::<u64>(None);
        drop(resolver);
        assert!(handle.wait().await.unwrap_err().is_connection());
    }

    #[test]
    fn test_blocking_wait_from_plain_thread() {
        let (resolver, handle) = result_channel::<String>(None);
        let waiter = std::thread::spawn(move || handle.blocking_wait());
        resolver.resolve(Ok("done".into()));
        assert_eq!(waiter.join().unwrap().unwrap(), "done");
    }

    #[test]
    fn test_try_take_is_none_while_pending() {
        let (resolver, mut handle) = result_channel::<u64>(None);
        assert!(handle.try_take().is_none());
        resolver.resolve(Ok(1));
        assert_eq!(handle.try_take().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_abort_all_resolves_every_table() {
        let tables = CorrelationTables::default();
        let active = ActiveSubscriptions::default();
        let handler: EventHandler = Arc::new(|_: &crate::session::Event| {});

        let mut handles = Vec::new();
        for id in 1..=3 {
            let (resolver, handle) = result_channel::<CallResult>(Some(id));
            lock(&tables.calls).insert(id, resolver);
            handles.push(handle);
        }
        let (sub_resolver, mut sub_handle) = result_channel::<Subscription>(Some(4));
        lock(&tables.subscribes).insert(
            4,
            PendingSubscribe {
                topic: "topic.x".into(),
                handler: Arc::clone(&handler),
                resolver: sub_resolver,
            },
        );
        let (unsub_resolver, mut unsub_handle) = result_channel::<()>(Some(5));
        lock(&tables.unsubscribes).insert(
            5,
            PendingUnsubscribe {
                subscription: 77,
                resolver: unsub_resolver,
            },
        );
        active.insert(77, handler);

        assert_eq!(tables.abort_all("shutdown", &active), 5);

        for mut handle in handles {
            let err = handle.try_take().unwrap().unwrap_err();
            assert_eq!(err.to_string(), "shutdown");
        }
        assert!(sub_handle.try_take().unwrap().unwrap_err().is_connection());
        assert!(unsub_handle.try_take().unwrap().unwrap_err().is_connection());
        assert_eq!(lock(&tables.calls).len(), 0);
        assert_eq!(lock(&tables.subscribes).len(), 0);
        assert_eq!(lock(&tables.unsubscribes).len(), 0);
        assert!(active.get(77).is_none());
    }
}
