//! Remote procedure calls.

use serde_json::Value;
use wampkit_protocol::{ClientMessage, Dict, Id, List, MessageCode};

use crate::error::{ProtocolError, ServerError, WampError};
use crate::session::pending::{result_channel, CallResult, ResultHandle};
use crate::session::SessionShared;
use crate::sync::lock;

pub const KWARGS_MESSAGE: &str = "Expected an object in kwargs";

/// Accept `null` (no keyword arguments) or an object.
fn keyword_arguments(kwargs: Value) -> Result<Dict, WampError> {
    match kwargs {
        Value::Null => Ok(Dict::new()),
        Value::Object(map) => Ok(map),
        _ => Err(WampError::invalid_argument(KWARGS_MESSAGE)),
    }
}

impl SessionShared {
    pub(crate) fn call(
        &self,
        procedure: &str,
        args: List,
        kwargs: Value,
        options: Dict,
    ) -> Result<ResultHandle<CallResult>, WampError> {
        self.require_session()?;
        let kwargs = keyword_arguments(kwargs)?;

        // Insert and enqueue under one lock so the reply cannot beat the entry.
        let mut calls = lock(&self.tables.calls);
        let request = self.request_ids.next();
        let (resolver, handle) = result_channel(Some(request));
        calls.insert(request, resolver);

        let message = ClientMessage::Call {
            request,
            options,
            procedure: procedure.to_string(),
            args,
            kwargs,
        };
        if let Err(e) = self.outbound.enqueue(&message) {
            calls.take(request);
            return Err(e);
        }

        tracing::debug!(
            request_id = request,
            procedure,
            pending = calls.len(),
            "CALL enqueued"
        );
        Ok(handle)
    }

    pub(crate) fn on_result(&self, request: Id, result: CallResult) -> Result<(), ProtocolError> {
        let resolver =
            lock(&self.tables.calls)
                .take(request)
                .ok_or(ProtocolError::UnknownRequest {
                    code: MessageCode::Result,
                    request,
                })?;

        resolver.resolve(Ok(result));
        Ok(())
    }

    pub(crate) fn on_call_error(&self, request: Id, error: ServerError) {
        match lock(&self.tables.calls).take(request) {
            Some(resolver) => {
                tracing::debug!(request_id = request, error = %error, "Call failed");
                resolver.resolve(Err(error.into()));
            }
            None => {
                tracing::debug!(request_id = request, "ERROR for non-pending CALL");
            }
        }
    }
}
