//! Topic subscriptions and EVENT delivery.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use wampkit_protocol::{ClientMessage, Dict, Id, List, MessageCode};

use crate::error::{ProtocolError, ServerError, WampError};
use crate::session::pending::{
    result_channel, CallResult, PendingSubscribe, PendingUnsubscribe, ResultHandle,
};
use crate::session::SessionShared;
use crate::sync::lock;

/// Callback invoked for each EVENT on a subscription.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// An established subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Router-assigned subscription id
    pub id: Id,
    pub topic: String,
}

/// One publication delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub subscription: Id,
    pub publication: Id,
    pub details: Dict,
    pub args: List,
    pub kwargs: Dict,
}

impl Event {
    /// Keyword payload, or positional payload keyed by index, or `{}`.
    pub fn payload(&self) -> Value {
        CallResult {
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
        }
        .into_value()
    }
}

/// Subscription id → handler for subscriptions the router has confirmed.
#[derive(Default)]
pub(crate) struct ActiveSubscriptions {
    handlers: Mutex<HashMap<Id, EventHandler>>,
}

impl ActiveSubscriptions {
    pub(crate) fn insert(&self, subscription: Id, handler: EventHandler) {
        lock(&self.handlers).insert(subscription, handler);
    }

    pub(crate) fn remove(&self, subscription: Id) -> bool {
        lock(&self.handlers).remove(&subscription).is_some()
    }

    pub(crate) fn get(&self, subscription: Id) -> Option<EventHandler> {
        lock(&self.handlers).get(&subscription).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub(crate) fn lock_table(&self) -> MutexGuard<'_, HashMap<Id, EventHandler>> {
        lock(&self.handlers)
    }
}

impl SessionShared {
    pub(crate) fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        options: Dict,
    ) -> Result<ResultHandle<Subscription>, WampError> {
        self.require_session()?;

        let mut pending = lock(&self.tables.subscribes);
        let request = self.request_ids.next();
        let (resolver, handle) = result_channel(Some(request));
        pending.insert(
            request,
            PendingSubscribe {
                topic: topic.to_string(),
                handler,
                resolver,
            },
        );

        let message = ClientMessage::Subscribe {
            request,
            options,
            topic: topic.to_string(),
        };
        if let Err(e) = self.outbound.enqueue(&message) {
            pending.take(request);
            return Err(e);
        }

        tracing::debug!(request_id = request, topic, "SUBSCRIBE enqueued");
        Ok(handle)
    }

    pub(crate) fn unsubscribe(&self, subscription: Id) -> Result<ResultHandle<()>, WampError> {
        self.require_session()?;

        let mut pending = lock(&self.tables.unsubscribes);
        let request = self.request_ids.next();
        let (resolver, handle) = result_channel(Some(request));
        pending.insert(
            request,
            PendingUnsubscribe {
                subscription,
                resolver,
            },
        );

        if let Err(e) = self.outbound.enqueue(&ClientMessage::Unsubscribe {
            request,
            subscription,
        }) {
            pending.take(request);
            return Err(e);
        }

        tracing::debug!(
            request_id = request,
            subscription_id = subscription,
            "UNSUBSCRIBE enqueued"
        );
        Ok(handle)
    }

    /// Activate the handler before resolving, so an EVENT right behind SUBSCRIBED is
    /// already routable.
    pub(crate) fn on_subscribed(&self, request: Id, subscription: Id) -> Result<(), ProtocolError> {
        let mut pending = lock(&self.tables.subscribes);
        let Some(entry) = pending.take(request) else {
            return Err(ProtocolError::UnknownRequest {
                code: MessageCode::Subscribed,
                request,
            });
        };
        self.subscriptions.insert(subscription, entry.handler);
        drop(pending);

        tracing::debug!(
            request_id = request,
            subscription_id = subscription,
            topic = %entry.topic,
            "Subscribed"
        );
        entry.resolver.resolve(Ok(Subscription {
            id: subscription,
            topic: entry.topic,
        }));
        Ok(())
    }

    pub(crate) fn on_subscribe_error(&self, request: Id, error: ServerError) {
        match lock(&self.tables.subscribes).take(request) {
            Some(entry) => {
                tracing::debug!(request_id = request, topic = %entry.topic, error = %error, "Subscribe rejected");
                entry.resolver.resolve(Err(error.into()));
            }
            None => {
                tracing::debug!(request_id = request, "ERROR for non-pending SUBSCRIBE");
            }
        }
    }

    pub(crate) fn on_unsubscribed(&self, request: Id) -> Result<(), ProtocolError> {
        let entry = lock(&self.tables.unsubscribes).take(request).ok_or(
            ProtocolError::UnknownRequest {
                code: MessageCode::Unsubscribed,
                request,
            },
        )?;

        self.subscriptions.remove(entry.subscription);
        entry.resolver.resolve(Ok(()));
        Ok(())
    }

    pub(crate) fn on_unsubscribe_error(&self, request: Id, error: ServerError) {
        match lock(&self.tables.unsubscribes).take(request) {
            Some(entry) => {
                entry.resolver.resolve(Err(error.into()));
            }
            None => {
                tracing::debug!(request_id = request, "ERROR for non-pending UNSUBSCRIBE");
            }
        }
    }

    /// Deliver an EVENT. Unknown subscriptions are skipped; the handler runs outside
    /// the table lock.
    pub(crate) fn on_event(&self, event: Event) {
        let Some(handler) = self.subscriptions.get(event.subscription) else {
            tracing::debug!(
                subscription_id = event.subscription,
                "Skipping EVENT for non-existent subscription ID"
            );
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
            tracing::error!(
                subscription_id = event.subscription,
                publication_id = event.publication,
                "Event handler panicked"
            );
        }
    }
}
