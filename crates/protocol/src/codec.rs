//! JSON array wire codec
//!
//! Decoding dispatches on the leading type code and validates arity and field types for
//! every shape a caller/subscriber can receive. Encoding is infallible.

use serde_json::Value;

use crate::codes::MessageCode;
use crate::error::{ArityRule, CodecError};
use crate::messages::{ClientMessage, Dict, Id, List, RouterMessage};

/// Serialize a client message to its UTF-8 JSON text frame.
pub fn encode(message: &ClientMessage) -> String {
    message.to_value().to_string()
}

/// Parse an inbound text frame.
pub fn decode(text: &str) -> Result<RouterMessage, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value)
}

/// Decode an already-parsed JSON document.
pub fn decode_value(value: Value) -> Result<RouterMessage, CodecError> {
    let Value::Array(items) = value else {
        return Err(CodecError::NotAnArray);
    };

    let raw_code = items
        .first()
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingTypeCode)?;
    let code = MessageCode::try_from(raw_code)?;

    let mut fields = Fields { code, items };

    let message = match code {
        MessageCode::Welcome => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Welcome {
                session: fields.id(1)?,
                details: fields.dict(2)?,
            }
        }
        MessageCode::Abort => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Abort {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            }
        }
        MessageCode::Challenge => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Challenge {
                method: fields.string(1)?,
                extra: fields.dict(2)?,
            }
        }
        MessageCode::Goodbye => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Goodbye {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            }
        }
        MessageCode::Error => {
            fields.expect(ArityRule::AtLeast(5))?;
            RouterMessage::Error {
                request_type: fields.id(1)?,
                request: fields.id(2)?,
                details: fields.dict(3)?,
                error: fields.string(4)?,
                args: fields.optional_list(5)?,
                kwargs: fields.optional_dict(6)?,
            }
        }
        MessageCode::Subscribed => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Subscribed {
                request: fields.id(1)?,
                subscription: fields.id(2)?,
            }
        }
        MessageCode::Unsubscribed => {
            fields.expect(ArityRule::Exactly(2))?;
            RouterMessage::Unsubscribed {
                request: fields.id(1)?,
            }
        }
        MessageCode::Event => {
            fields.expect(ArityRule::AtLeast(4))?;
            RouterMessage::Event {
                subscription: fields.id(1)?,
                publication: fields.id(2)?,
                details: fields.dict(3)?,
                args: fields.optional_list(4)?,
                kwargs: fields.optional_dict(5)?,
            }
        }
        MessageCode::Result => {
            fields.expect(ArityRule::AtLeast(3))?;
            RouterMessage::Result {
                request: fields.id(1)?,
                details: fields.dict(2)?,
                args: fields.optional_list(3)?,
                kwargs: fields.optional_dict(4)?,
            }
        }
        MessageCode::Registered => {
            fields.expect(ArityRule::Exactly(3))?;
            RouterMessage::Registered {
                request: fields.id(1)?,
                registration: fields.id(2)?,
            }
        }
        MessageCode::Heartbeat | MessageCode::Published | MessageCode::Unregistered => {
            RouterMessage::Ignored(code)
        }
        other => RouterMessage::Unexpected(other),
    };

    Ok(message)
}

/// Positional accessor over a message array that reports typed codec errors.
struct Fields {
    code: MessageCode,
    items: Vec<Value>,
}

impl Fields {
    fn expect(&self, rule: ArityRule) -> Result<(), CodecError> {
        let actual = self.items.len();
        let ok = match rule {
            ArityRule::Exactly(n) => actual == n,
            ArityRule::AtLeast(n) => actual >= n,
        };
        if ok {
            Ok(())
        } else {
            Err(CodecError::Arity {
                code: self.code,
                expected: rule,
                actual,
            })
        }
    }

    fn id(&self, index: usize) -> Result<Id, CodecError> {
        self.items
            .get(index)
            .and_then(Value::as_u64)
            .ok_or_else(|| CodecError::field(self.code, index, "an integer id"))
    }

    fn string(&mut self, index: usize) -> Result<String, CodecError> {
        match self.take(index) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(CodecError::field(self.code, index, "a string")),
        }
    }

    fn dict(&mut self, index: usize) -> Result<Dict, CodecError> {
        match self.take(index) {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(CodecError::field(self.code, index, "a dict")),
        }
    }

    fn optional_list(&mut self, index: usize) -> Result<List, CodecError> {
        match self.take(index) {
            None => Ok(List::new()),
            Some(Value::Array(list)) => Ok(list),
            Some(_) => Err(CodecError::field(self.code, index, "a list")),
        }
    }

    fn optional_dict(&mut self, index: usize) -> Result<Dict, CodecError> {
        match self.take(index) {
            None => Ok(Dict::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(CodecError::field(self.code, index, "a dict")),
        }
    }

    fn take(&mut self, index: usize) -> Option<Value> {
        self.items.get_mut(index).map(Value::take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_welcome() {
        let msg = decode(r#"[2, 9129137332, {"authid": "joe", "authrole": "user"}]"#).unwrap();
        match msg {
            RouterMessage::Welcome { session, details } => {
                assert_eq!(session, 9129137332);
                assert_eq!(details["authid"], "joe");
            }
            other => panic!("Expected Welcome, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_result_without_arguments() {
        let msg = decode("[50, 7, {}]").unwrap();
        assert_eq!(
            msg,
            RouterMessage::Result {
                request: 7,
                details: Dict::new(),
                args: List::new(),
                kwargs: Dict::new(),
            }
        );
    }

    #[test]
    fn test_decode_result_with_args_and_kwargs() {
        let msg = decode(r#"[50, 7, {}, ["a"], {"k": 1}]"#).unwrap();
        let RouterMessage::Result { args, kwargs, .. } = msg else {
            panic!("Expected Result");
        };
        assert_eq!(args, vec![json!("a")]);
        assert_eq!(kwargs["k"], 1);
    }

    #[test]
    fn test_decode_error_for_subscribe() {
        let msg = decode(r#"[8, 32, 4, {}, "wamp.error.not_authorized"]"#).unwrap();
        let RouterMessage::Error {
            request_type,
            request,
            error,
            args,
            kwargs,
            ..
        } = msg
        else {
            panic!("Expected Error");
        };
        assert_eq!(request_type, 32);
        assert_eq!(request, 4);
        assert_eq!(error, "wamp.error.not_authorized");
        assert!(args.is_empty());
        assert!(kwargs.is_empty());
    }

    #[test]
    fn test_decode_error_with_kwargs() {
        let msg = decode(r#"[8, 48, 2, {}, "ak.wwise.invalid", [], {"message": "nope"}]"#).unwrap();
        let RouterMessage::Error { kwargs, .. } = msg else {
            panic!("Expected Error");
        };
        assert_eq!(kwargs["message"], "nope");
    }

    #[test]
    fn test_decode_event_payload() {
        let msg = decode(r#"[36, 5512315355, 4429313566, {}, [1, 2], {"color": "orange"}]"#).unwrap();
        let RouterMessage::Event {
            subscription,
            publication,
            args,
            kwargs,
            ..
        } = msg
        else {
            panic!("Expected Event");
        };
        assert_eq!(subscription, 5512315355);
        assert_eq!(publication, 4429313566);
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs["color"], "orange");
    }

    #[test]
    fn test_subscribed_wrong_arity() {
        let err = decode("[33, 1]").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Arity {
                code: MessageCode::Subscribed,
                expected: ArityRule::Exactly(3),
                actual: 2,
            }
        ));
    }

    #[test]
    fn test_event_arguments_must_be_a_list() {
        let err = decode(r#"[36, 1, 2, {}, {"not": "a list"}]"#).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FieldType {
                code: MessageCode::Event,
                index: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_welcome_requires_numeric_session() {
        let err = decode(r#"[2, "abc", {}]"#).unwrap_err();
        assert!(matches!(err, CodecError::FieldType { index: 1, .. }));
    }

    #[test]
    fn test_rejects_non_json_and_non_array() {
        assert!(matches!(decode("{oops"), Err(CodecError::InvalidJson(_))));
        assert!(matches!(decode(r#"{"a": 1}"#), Err(CodecError::NotAnArray)));
        assert!(matches!(decode(r#"["x"]"#), Err(CodecError::MissingTypeCode)));
        assert!(matches!(decode("[]"), Err(CodecError::MissingTypeCode)));
        assert!(matches!(decode("[99]"), Err(CodecError::UnknownCode(99))));
    }

    #[test]
    fn test_client_role_codes_decode_as_unexpected() {
        for code in [1u64, 16, 32, 48, 64, 66, 70] {
            let msg = decode(&format!("[{}, 1, {{}}]", code)).unwrap();
            assert!(
                matches!(msg, RouterMessage::Unexpected(_)),
                "code {} should be unexpected",
                code
            );
        }
    }

    #[test]
    fn test_callee_codes_decode_as_unexpected() {
        assert_eq!(
            decode("[68, 1, 2, {}]").unwrap(),
            RouterMessage::Unexpected(MessageCode::Invocation)
        );
        assert_eq!(
            decode("[69, 1, {}]").unwrap(),
            RouterMessage::Unexpected(MessageCode::Interrupt)
        );
    }

    #[test]
    fn test_ignored_codes() {
        assert_eq!(
            decode("[17, 1, 2]").unwrap(),
            RouterMessage::Ignored(MessageCode::Published)
        );
        assert_eq!(
            decode("[7, 1, 2]").unwrap(),
            RouterMessage::Ignored(MessageCode::Heartbeat)
        );
    }

    #[test]
    fn test_encode_subscribe() {
        let text = encode(&ClientMessage::Subscribe {
            request: 1,
            options: Dict::new(),
            topic: "topic.x".into(),
        });
        assert_eq!(text, r#"[32,1,{},"topic.x"]"#);
    }
}
