//! Inbound frame dispatch
//!
//! Runs on the transport's receive task. Each frame is decoded and routed by type
//! code; anything the router should not have sent comes back as a `ProtocolError` and
//! is handled according to the configured `ViolationPolicy`.

use std::sync::{Arc, Weak};

use wampkit_protocol::{decode, ClientMessage, Dict, MessageCode, RouterMessage};

use crate::config::ViolationPolicy;
use crate::error::{ProtocolError, ServerError, WampError};
use crate::ports::TransportHandler;
use crate::session::pending::CallResult;
use crate::session::state::{AuthInfo, SessionState};
use crate::session::subscriptions::Event;
use crate::session::{SessionShared, GOODBYE_REPLY_REASON};
use crate::sync::lock;

/// Transport callback target for one connection of a session.
pub(crate) struct SessionLink {
    pub(crate) session: Weak<SessionShared>,
    pub(crate) generation: u64,
}

impl TransportHandler for SessionLink {
    fn on_message(&self, text: &str) {
        if let Some(session) = self.session.upgrade() {
            if session.is_generation(self.generation) {
                session.handle_frame(self.generation, text);
            }
        }
    }

    fn on_connection_lost(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_lost(self.generation);
        }
    }
}

impl SessionShared {
    pub(crate) fn handle_frame(self: &Arc<Self>, generation: u64, text: &str) {
        if let Err(violation) = self.dispatch(text) {
            self.report_violation(generation, violation);
        }
    }

    /// `generation` is the connection the offending frame arrived on; an abort never
    /// reaches past it.
    fn report_violation(self: &Arc<Self>, generation: u64, violation: ProtocolError) {
        match self.options.violation_policy {
            ViolationPolicy::Log => {
                tracing::warn!(error = %violation, "WAMP protocol violation");
            }
            ViolationPolicy::Abort => {
                tracing::error!(error = %violation, "WAMP protocol violation, aborting session");
                if self.is_generation(generation) {
                    self.state.set(SessionState::Faulted);
                }

                // Never stop inline: this runs on the transport's receive task.
                let session = Arc::clone(self);
                let reason = violation.to_string();
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(async move {
                            session.stop_connection(generation, &reason).await
                        });
                    }
                    Err(_) => {
                        tracing::error!("No tokio runtime available to stop the session");
                    }
                }
            }
        }
    }

    pub(crate) fn dispatch(&self, text: &str) -> Result<(), ProtocolError> {
        match decode(text)? {
            RouterMessage::Welcome { session, details } => self.on_welcome(session, &details),
            RouterMessage::Abort { details, reason } => {
                self.on_abort(details, reason);
                Ok(())
            }
            RouterMessage::Challenge { method, .. } => self.on_challenge(method),
            RouterMessage::Goodbye { reason, .. } => self.on_goodbye(reason),
            RouterMessage::Error {
                request_type,
                request,
                error,
                args,
                kwargs,
                ..
            } => {
                let error = ServerError::new(error, args, kwargs);
                match MessageCode::from_u64(request_type) {
                    Some(MessageCode::Call) => self.on_call_error(request, error),
                    Some(MessageCode::Subscribe) => self.on_subscribe_error(request, error),
                    Some(MessageCode::Unsubscribe) => self.on_unsubscribe_error(request, error),
                    _ => return Err(ProtocolError::UnhandledError(request_type)),
                }
                Ok(())
            }
            RouterMessage::Subscribed {
                request,
                subscription,
            } => self.on_subscribed(request, subscription),
            RouterMessage::Unsubscribed { request } => self.on_unsubscribed(request),
            RouterMessage::Event {
                subscription,
                publication,
                details,
                args,
                kwargs,
            } => {
                self.on_event(Event {
                    subscription,
                    publication,
                    details,
                    args,
                    kwargs,
                });
                Ok(())
            }
            RouterMessage::Result {
                request,
                args,
                kwargs,
                ..
            } => self.on_result(request, CallResult { args, kwargs }),
            // Nothing is ever registered by this client.
            RouterMessage::Registered { request, .. } => Err(ProtocolError::UnknownRequest {
                code: MessageCode::Registered,
                request,
            }),
            RouterMessage::Unexpected(code) => Err(ProtocolError::UnexpectedMessage(code)),
            RouterMessage::Ignored(code) => {
                tracing::trace!(code = %code, "Ignoring message");
                Ok(())
            }
        }
    }

    fn on_welcome(&self, session: u64, details: &Dict) -> Result<(), ProtocolError> {
        let mut join = lock(&self.join);

        let auth = match AuthInfo::from_details(details) {
            Ok(auth) => auth,
            Err(violation) => {
                if let Some(resolver) = join.take() {
                    resolver.resolve(Err(violation.clone().into()));
                }
                return Err(violation);
            }
        };

        *lock(&self.auth_info) = auth;
        self.session_id.store(session, std::sync::atomic::Ordering::SeqCst);
        self.state.set_unless_faulted(SessionState::Joined);
        tracing::info!(session_id = session, "Joined WAMP realm");

        match join.take() {
            Some(resolver) => {
                resolver.resolve(Ok(session));
            }
            None => tracing::debug!(session_id = session, "WELCOME without an outstanding join"),
        }
        Ok(())
    }

    fn on_abort(&self, details: Dict, reason: String) {
        tracing::warn!(reason = %reason, "Router aborted the join");
        let resolver = lock(&self.join).take();
        self.state.set_unless_faulted(SessionState::Connected);

        match resolver {
            Some(resolver) => {
                resolver.resolve(Err(WampError::Server(ServerError::new(
                    reason,
                    Vec::new(),
                    details,
                ))));
            }
            None => tracing::debug!("ABORT without an outstanding join"),
        }
    }

    fn on_challenge(&self, method: String) -> Result<(), ProtocolError> {
        let violation = ProtocolError::UnsupportedAuth(method);
        if let Some(resolver) = lock(&self.join).take() {
            resolver.resolve(Err(violation.clone().into()));
        }
        self.state.set_unless_faulted(SessionState::Connected);
        Err(violation)
    }

    fn on_goodbye(&self, reason: String) -> Result<(), ProtocolError> {
        use std::sync::atomic::Ordering;

        // Reply to our own leave.
        if self.goodbye_sent.swap(false, Ordering::SeqCst) {
            tracing::info!(reason = %reason, "Left WAMP realm");
            self.state.set_unless_faulted(SessionState::Closed);
            if let Some(resolver) = lock(&self.leave).take() {
                resolver.resolve(Ok(reason));
            }
            return Ok(());
        }

        if self.session_id.swap(0, Ordering::SeqCst) == 0 {
            return Err(ProtocolError::NoSession(MessageCode::Goodbye));
        }

        tracing::info!(reason = %reason, "Router closed the WAMP session");
        self.state.set_unless_faulted(SessionState::Closed);
        let reply = ClientMessage::Goodbye {
            details: Dict::new(),
            reason: GOODBYE_REPLY_REASON.into(),
        };
        if let Err(e) = self.outbound.enqueue(&reply) {
            tracing::debug!(error = %e, "Could not answer GOODBYE");
        }
        Ok(())
    }
}
