//! Request/response facade over a `Session`.
//!
//! Every method waits for its reply (bounded by the configured request timeout) and
//! returns a plain `Result`. Failures are logged here so callers that only check the
//! outcome still leave a trace.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use wampkit_protocol::{Dict, Id};

use crate::config::ClientConfig;
use crate::error::WampError;
use crate::infrastructure::WebSocketTransport;
use crate::ports::Transport;
use crate::session::{
    DisconnectHandler, Event, EventHandler, ResultHandle, Session, SessionOptions, Subscription,
    DESTRUCTION_REASON,
};

pub const INVALID_ARGS_MESSAGE: &str =
    "in_args should contain a valid JSON object string (empty object is allowed).";
pub const INVALID_OPTIONS_MESSAGE: &str =
    "in_options should contain a valid JSON object string (empty object is allowed).";

/// WAMP client bound to one session.
pub struct Client {
    session: Session,
    config: ClientConfig,
}

impl Client {
    /// A client that connects over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let session = Session::new(transport, SessionOptions::from(&config));
        Self { session, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Open the transport and join the configured realm. Returns the session id.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        on_disconnect: Option<DisconnectHandler>,
    ) -> Result<Id, WampError> {
        if let Err(e) = self.session.start(host, port, on_disconnect).await {
            tracing::warn!(host, port, error = %e, "Failed to connect");
            return Err(e);
        }

        let join = self.session.join(&self.config.realm, None);
        self.wait(join, self.config.request_timeout())
            .await
            .inspect_err(|e| tracing::warn!(realm = %self.config.realm, error = %e, "Failed to join realm"))
    }

    /// Connect to the host and port from the configuration.
    pub async fn connect_configured(
        &self,
        on_disconnect: Option<DisconnectHandler>,
    ) -> Result<Id, WampError> {
        let (host, port) = (self.config.host.clone(), self.config.port);
        self.connect(&host, port, on_disconnect).await
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub async fn disconnect(&self) {
        self.session.stop(DESTRUCTION_REASON).await;
    }

    /// Call `procedure` with keyword arguments and options, returning the result
    /// document.
    pub async fn call(
        &self,
        procedure: &str,
        args: Value,
        options: Value,
    ) -> Result<Value, WampError> {
        self.call_with_timeout(procedure, args, options, self.config.request_timeout())
            .await
    }

    /// Like `call`, with an explicit timeout. `None` waits indefinitely.
    pub async fn call_with_timeout(
        &self,
        procedure: &str,
        args: Value,
        options: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, WampError> {
        let outcome = async {
            let options = object_or_empty(options, INVALID_OPTIONS_MESSAGE)?;
            let handle = self.session.call(procedure, Vec::new(), args, options)?;
            self.wait(handle, timeout).await
        }
        .await;

        match outcome {
            Ok(result) => Ok(result.into_value()),
            Err(e) => {
                tracing::warn!(procedure, error = %e, "WAMP call failed");
                Err(e)
            }
        }
    }

    /// Text variant of `call`: both documents are JSON object strings and the result
    /// comes back serialized.
    pub async fn call_json(
        &self,
        procedure: &str,
        args: &str,
        options: &str,
    ) -> Result<String, WampError> {
        let (args, options) = match (
            parse_object(args, INVALID_ARGS_MESSAGE),
            parse_object(options, INVALID_OPTIONS_MESSAGE),
        ) {
            (Ok(args), Ok(options)) => (args, options),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(procedure, error = %e, "Rejected call arguments");
                return Err(e);
            }
        };

        let result = self.call(procedure, args, options).await?;
        Ok(result.to_string())
    }

    /// Subscribe to `topic`; `handler` runs on the receive task for every EVENT.
    pub async fn subscribe<F>(
        &self,
        topic: &str,
        options: Value,
        handler: F,
    ) -> Result<Subscription, WampError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let outcome = async {
            let options = object_or_empty(options, INVALID_OPTIONS_MESSAGE)?;
            let handle = self.session.subscribe(topic, handler, options)?;
            self.wait(handle, self.config.request_timeout()).await
        }
        .await;

        outcome.inspect_err(|e| tracing::warn!(topic, error = %e, "Subscribe failed"))
    }

    pub async fn unsubscribe(&self, subscription: Id) -> Result<(), WampError> {
        let outcome = async {
            let handle = self.session.unsubscribe(subscription)?;
            self.wait(handle, self.config.request_timeout()).await
        }
        .await;

        outcome.inspect_err(|e| {
            tracing::warn!(subscription_id = subscription, error = %e, "Unsubscribe failed")
        })
    }

    async fn wait<T>(
        &self,
        handle: ResultHandle<T>,
        timeout: Option<Duration>,
    ) -> Result<T, WampError> {
        match timeout {
            Some(timeout) => {
                let request_id = handle.request_id();
                let result = handle.wait_timeout(timeout).await;
                if matches!(result, Err(WampError::Timeout)) {
                    tracing::debug!(
                        request_id = ?request_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Request timed out"
                    );
                }
                result
            }
            None => handle.wait().await,
        }
    }
}

fn object_or_empty(value: Value, message: &str) -> Result<Dict, WampError> {
    match value {
        Value::Null => Ok(Dict::new()),
        Value::Object(map) => Ok(map),
        _ => Err(WampError::invalid_argument(message)),
    }
}

fn parse_object(text: &str, message: &str) -> Result<Value, WampError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        _ => Err(WampError::invalid_argument(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackTransport;
    use serde_json::json;
    use std::sync::Mutex;

    fn client_with(config: ClientConfig) -> (Client, Arc<LoopbackTransport>) {
        let transport = LoopbackTransport::new();
        let client = Client::with_transport(config, transport.clone());
        (client, transport)
    }

    async fn connected(config: ClientConfig) -> (Client, Arc<LoopbackTransport>) {
        let (client, transport) = client_with(config);
        let (joined, _) = tokio::join!(client.connect("127.0.0.1", 8080, None), async {
            transport.wait_for_sent(1).await;
            transport.deliver(json!([2, 17, {}]));
        });
        assert_eq!(joined.unwrap(), 17);
        (client, transport)
    }

    /// Answer the `index`-th outbound frame with `reply(request_id)`.
    async fn reply_to(transport: &LoopbackTransport, index: usize, reply: impl Fn(u64) -> Value) {
        let sent = transport.wait_for_sent(index + 1).await;
        let request_id = sent[index][1].as_u64().unwrap();
        transport.deliver(reply(request_id));
    }

    #[tokio::test]
    async fn test_connect_joins_configured_realm() {
        let config = ClientConfig {
            realm: "wwise".into(),
            ..ClientConfig::default()
        };
        let (client, transport) = connected(config).await;

        assert!(client.is_connected());
        assert_eq!(transport.sent()[0][1], "wwise");
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let (client, transport) = client_with(ClientConfig::default());
        transport.set_fail_open(true);

        let err = client.connect("127.0.0.1", 8080, None).await.unwrap_err();
        assert!(err.is_connection());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_call_returns_kwargs_document() {
        let (client, transport) = connected(ClientConfig::default()).await;

        let (result, _) = tokio::join!(
            client.call("ak.wwise.core.getInfo", json!({}), Value::Null),
            reply_to(&transport, 1, |id| json!([50, id, {}, [], {"version": {"year": 2023}}]))
        );

        assert_eq!(result.unwrap(), json!({"version": {"year": 2023}}));
    }

    #[tokio::test]
    async fn test_call_json_roundtrip_text() {
        let (client, transport) = connected(ClientConfig::default()).await;

        let (result, _) = tokio::join!(
            client.call_json("echo.test", r#"{"a": 1}"#, "{}"),
            reply_to(&transport, 1, |id| json!([50, id, {}, ["a"]]))
        );

        let sent = transport.sent();
        assert_eq!(sent[1][5], json!({"a": 1}));
        let parsed: Value = serde_json::from_str(&result.unwrap()).unwrap();
        assert_eq!(parsed, json!({"0": "a"}));
    }

    #[tokio::test]
    async fn test_call_json_rejects_invalid_documents() {
        let (client, transport) = connected(ClientConfig::default()).await;

        let err = client.call_json("x", "not json", "{}").await.unwrap_err();
        assert_eq!(err.to_document(), json!({"message": INVALID_ARGS_MESSAGE}));

        let err = client.call_json("x", "{}", "[1]").await.unwrap_err();
        assert_eq!(err.to_document(), json!({"message": INVALID_OPTIONS_MESSAGE}));

        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_call_server_error_document() {
        let (client, transport) = connected(ClientConfig::default()).await;

        let (result, _) = tokio::join!(
            client.call("ak.wwise.core.object.get", json!({}), json!({})),
            reply_to(&transport, 1, |id| {
                json!([8, 48, id, {}, "ak.wwise.query.invalid", [], {"message": "bad"}])
            })
        );

        let err = result.unwrap_err();
        assert_eq!(err.to_document()["uri"], "ak.wwise.query.invalid");
        assert_eq!(err.to_document()["message"], "bad");
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let config = ClientConfig {
            request_timeout_ms: 20,
            ..ClientConfig::default()
        };
        let (client, _transport) = connected(config).await;

        let err = client.call("slow", json!({}), json!({})).await.unwrap_err();
        assert!(matches!(err, WampError::Timeout));
        assert_eq!(
            err.to_document(),
            json!({"message": "Failed to receive WAAPI message in time."})
        );
    }

    #[tokio::test]
    async fn test_call_before_connect_is_no_session() {
        let (client, _transport) = client_with(ClientConfig::default());

        let err = client.call("x", json!({}), json!({})).await.unwrap_err();
        assert_eq!(err.to_document(), json!({"message": "session not joined"}));
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let (client, transport) = connected(ClientConfig::default()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let (subscription, _) = tokio::join!(
            client.subscribe("ak.wwise.ui.selectionChanged", json!({}), move |event: &Event| {
                sink.lock().unwrap().push(event.payload());
            }),
            reply_to(&transport, 1, |id| json!([33, id, 300]))
        );
        let subscription = subscription.unwrap();
        assert_eq!(subscription.id, 300);

        transport.deliver(json!([36, 300, 1, {}, [], {"objects": []}]));
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"objects": []})]);

        let (unsubscribed, _) = tokio::join!(
            client.unsubscribe(300),
            reply_to(&transport, 2, |id| json!([35, id]))
        );
        unsubscribed.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_resolves_and_disconnects() {
        let (client, _transport) = connected(ClientConfig::default()).await;

        client.disconnect().await;

        assert!(!client.is_connected());
        let err = client.unsubscribe(1).await.unwrap_err();
        assert!(matches!(err, WampError::NoSession));
    }
}
