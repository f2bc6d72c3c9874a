//! WAMP message values exchanged with the router
//!
//! `ClientMessage` covers what a caller/subscriber sends, `RouterMessage` what it can receive.
//! Both are plain data; `codec` converts them to and from the JSON array format.

use serde_json::{json, Value};

use crate::codes::MessageCode;

/// A keyed document (WAMP `dict`).
pub type Dict = serde_json::Map<String, Value>;

/// A positional document (WAMP `list`).
pub type List = Vec<Value>;

/// Session, request, subscription and publication identifiers.
pub type Id = u64;

/// Roles advertised in HELLO.
pub const CLIENT_ROLES: [&str; 4] = ["caller", "callee", "publisher", "subscriber"];

// =============================================================================
// Client Messages (client → router)
// =============================================================================

/// Messages from the client to the router
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `[HELLO, Realm|uri, Details|dict]`
    Hello { realm: String, details: Dict },
    /// `[GOODBYE, Details|dict, Reason|uri]`
    Goodbye { details: Dict, reason: String },
    /// `[SUBSCRIBE, Request|id, Options|dict, Topic|uri]`
    Subscribe {
        request: Id,
        options: Dict,
        topic: String,
    },
    /// `[UNSUBSCRIBE, Request|id, SUBSCRIBED.Subscription|id]`
    Unsubscribe { request: Id, subscription: Id },
    /// `[CALL, Request|id, Options|dict, Procedure|uri, Arguments|list, ArgumentsKw|dict]`
    Call {
        request: Id,
        options: Dict,
        procedure: String,
        args: List,
        kwargs: Dict,
    },
}

impl ClientMessage {
    /// Build a HELLO advertising all four client roles.
    ///
    /// `auth` is `(authmethod, authid)`; an empty method means no login.
    pub fn hello(realm: impl Into<String>, auth: Option<(&str, &str)>) -> Self {
        let roles: Dict = CLIENT_ROLES
            .iter()
            .map(|role| (role.to_string(), Value::Object(Dict::new())))
            .collect();

        let mut details = Dict::new();
        details.insert("roles".into(), Value::Object(roles));

        if let Some((method, authid)) = auth.filter(|(method, _)| !method.is_empty()) {
            details.insert("authmethods".into(), json!([method]));
            details.insert("authid".into(), Value::String(authid.to_string()));
        }

        ClientMessage::Hello {
            realm: realm.into(),
            details,
        }
    }

    pub fn code(&self) -> MessageCode {
        match self {
            ClientMessage::Hello { .. } => MessageCode::Hello,
            ClientMessage::Goodbye { .. } => MessageCode::Goodbye,
            ClientMessage::Subscribe { .. } => MessageCode::Subscribe,
            ClientMessage::Unsubscribe { .. } => MessageCode::Unsubscribe,
            ClientMessage::Call { .. } => MessageCode::Call,
        }
    }

    /// Lay the message out as its positional JSON array.
    pub fn to_value(&self) -> Value {
        let code = self.code().to_u64();
        match self {
            ClientMessage::Hello { realm, details } => json!([code, realm, details]),
            ClientMessage::Goodbye { details, reason } => json!([code, details, reason]),
            ClientMessage::Subscribe {
                request,
                options,
                topic,
            } => json!([code, request, options, topic]),
            ClientMessage::Unsubscribe {
                request,
                subscription,
            } => json!([code, request, subscription]),
            ClientMessage::Call {
                request,
                options,
                procedure,
                args,
                kwargs,
            } => json!([code, request, options, procedure, args, kwargs]),
        }
    }
}

// =============================================================================
// Router Messages (router → client)
// =============================================================================

/// Messages from the router, as understood by a caller/subscriber peer
#[derive(Debug, Clone, PartialEq)]
pub enum RouterMessage {
    /// `[WELCOME, Session|id, Details|dict]`
    Welcome { session: Id, details: Dict },
    /// `[ABORT, Details|dict, Reason|uri]`
    Abort { details: Dict, reason: String },
    /// `[CHALLENGE, AuthMethod|string, Extra|dict]`
    Challenge { method: String, extra: Dict },
    /// `[GOODBYE, Details|dict, Reason|uri]`
    Goodbye { details: Dict, reason: String },
    /// `[ERROR, REQUEST.Type|int, REQUEST.Request|id, Details|dict, Error|uri, Arguments|list?, ArgumentsKw|dict?]`
    Error {
        request_type: u64,
        request: Id,
        details: Dict,
        error: String,
        args: List,
        kwargs: Dict,
    },
    /// `[SUBSCRIBED, SUBSCRIBE.Request|id, Subscription|id]`
    Subscribed { request: Id, subscription: Id },
    /// `[UNSUBSCRIBED, UNSUBSCRIBE.Request|id]`
    Unsubscribed { request: Id },
    /// `[EVENT, SUBSCRIBED.Subscription|id, PUBLISHED.Publication|id, Details|dict, Arguments|list?, ArgumentsKw|dict?]`
    Event {
        subscription: Id,
        publication: Id,
        details: Dict,
        args: List,
        kwargs: Dict,
    },
    /// `[RESULT, CALL.Request|id, Details|dict, Arguments|list?, ArgumentsKw|dict?]`
    Result {
        request: Id,
        details: Dict,
        args: List,
        kwargs: Dict,
    },
    /// `[REGISTERED, REGISTER.Request|id, Registration|id]`
    Registered { request: Id, registration: Id },
    /// A code only a router-side or callee peer should receive.
    Unexpected(MessageCode),
    /// A code this client accepts and ignores.
    Ignored(MessageCode),
}

impl RouterMessage {
    pub fn code(&self) -> MessageCode {
        match self {
            RouterMessage::Welcome { .. } => MessageCode::Welcome,
            RouterMessage::Abort { .. } => MessageCode::Abort,
            RouterMessage::Challenge { .. } => MessageCode::Challenge,
            RouterMessage::Goodbye { .. } => MessageCode::Goodbye,
            RouterMessage::Error { .. } => MessageCode::Error,
            RouterMessage::Subscribed { .. } => MessageCode::Subscribed,
            RouterMessage::Unsubscribed { .. } => MessageCode::Unsubscribed,
            RouterMessage::Event { .. } => MessageCode::Event,
            RouterMessage::Result { .. } => MessageCode::Result,
            RouterMessage::Registered { .. } => MessageCode::Registered,
            RouterMessage::Unexpected(code) | RouterMessage::Ignored(code) => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_without_auth_advertises_roles_only() {
        let hello = ClientMessage::hello("realm1", None);
        let value = hello.to_value();

        assert_eq!(value[0], 1);
        assert_eq!(value[1], "realm1");
        let details = value[2].as_object().unwrap();
        assert_eq!(details.len(), 1);
        for role in CLIENT_ROLES {
            assert!(details["roles"][role].is_object(), "missing role {}", role);
        }
    }

    #[test]
    fn test_hello_with_auth_adds_methods_and_id() {
        let value = ClientMessage::hello("realm1", Some(("ticket", "bob"))).to_value();

        assert_eq!(value[2]["authmethods"], json!(["ticket"]));
        assert_eq!(value[2]["authid"], "bob");
    }

    #[test]
    fn test_hello_with_empty_method_is_anonymous() {
        let value = ClientMessage::hello("realm1", Some(("", "bob"))).to_value();
        assert!(value[2].get("authmethods").is_none());
        assert!(value[2].get("authid").is_none());
    }

    #[test]
    fn test_call_always_carries_both_argument_fields() {
        let call = ClientMessage::Call {
            request: 7,
            options: Dict::new(),
            procedure: "echo.test".into(),
            args: vec![json!("a")],
            kwargs: Dict::new(),
        };

        assert_eq!(call.to_value(), json!([48, 7, {}, "echo.test", ["a"], {}]));
    }

    #[test]
    fn test_unsubscribe_layout() {
        let msg = ClientMessage::Unsubscribe {
            request: 3,
            subscription: 99,
        };
        assert_eq!(msg.code(), MessageCode::Unsubscribe);
        assert_eq!(msg.to_value(), json!([34, 3, 99]));
    }
}
