// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The decoded wire unit of the protocol.
//!
//! A `Frame` is transient: parsed from one `Content-Length` delimited body,
//! classified, dispatched and discarded. Serialization produces the standard
//! JSON-RPC 2.0 envelope; `id` is omitted for notifications and `params` is
//! omitted when absent.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use crate::errors::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Control notification asking the receiver to cancel an in-flight request.
pub const CANCEL_METHOD: &str = "$/cancelRequest";

/// A request id: caller-chosen, unique for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: RequestId,
        result: Value,
    },
    Error {
        id: Option<RequestId>,
        error: RpcError,
    },
    Cancel {
        id: RequestId,
    },
}

/// A structurally invalid inbound message. The read loop logs and drops
/// these; they never terminate the connection.
#[derive(Debug)]
pub struct FrameError(String);

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FrameError {}

impl Frame {
    /// Classifies a parsed JSON value as one of the frame kinds.
    pub fn parse(value: Value) -> Result<Frame, FrameError> {
        let message = value
            .as_object()
            .ok_or_else(|| FrameError(format!("message is not an object: {value}")))?;

        if let Some(method) = message.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| FrameError(format!("method is not a string: {method}")))?
                .to_string();
            let params = message.get("params").filter(|p| !p.is_null()).cloned();
            return match message.get("id").filter(|id| !id.is_null()) {
                Some(id) => Ok(Frame::Request {
                    id: parse_id(id)?,
                    method,
                    params,
                }),
                None if method == CANCEL_METHOD => {
                    let id = params
                        .as_ref()
                        .and_then(|p| p.get("id"))
                        .ok_or_else(|| FrameError("cancel notification without an id".into()))?;
                    Ok(Frame::Cancel { id: parse_id(id)? })
                }
                None => Ok(Frame::Notification { method, params }),
            };
        }

        if let Some(error) = message.get("error") {
            let error: RpcError = serde_json::from_value(error.clone())
                .map_err(|err| FrameError(format!("malformed error object: {err}")))?;
            let id = match message.get("id").filter(|id| !id.is_null()) {
                Some(id) => Some(parse_id(id)?),
                None => None,
            };
            return Ok(Frame::Error { id, error });
        }

        if let Some(result) = message.get("result") {
            let id = message
                .get("id")
                .filter(|id| !id.is_null())
                .ok_or_else(|| FrameError("response without an id".into()))?;
            return Ok(Frame::Response {
                id: parse_id(id)?,
                result: result.clone(),
            });
        }

        Err(FrameError(
            "message carries neither method, result nor error".into(),
        ))
    }
}

fn parse_id(value: &Value) -> Result<RequestId, FrameError> {
    serde_json::from_value(value.clone())
        .map_err(|_| FrameError(format!("id is neither a number nor a string: {value}")))
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Serialize)]
struct NotificationEnvelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Serialize)]
struct ResponseEnvelope<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    result: &'a Value,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    jsonrpc: &'static str,
    // JSON-RPC requires `"id": null` when the offender could not be identified.
    id: Option<&'a RequestId>,
    error: &'a RpcError,
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Frame::Request { id, method, params } => RequestEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id,
                method,
                params: params.as_ref(),
            }
            .serialize(serializer),
            Frame::Notification { method, params } => NotificationEnvelope {
                jsonrpc: JSONRPC_VERSION,
                method,
                params: params.as_ref(),
            }
            .serialize(serializer),
            Frame::Response { id, result } => ResponseEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id,
                result,
            }
            .serialize(serializer),
            Frame::Error { id, error } => ErrorEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id: id.as_ref(),
                error,
            }
            .serialize(serializer),
            Frame::Cancel { id } => {
                let params = json!({ "id": id });
                NotificationEnvelope {
                    jsonrpc: JSONRPC_VERSION,
                    method: CANCEL_METHOD,
                    params: Some(&params),
                }
                .serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_codes;

    #[test]
    fn test_parse_request() {
        let frame = Frame::parse(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "askServer",
            "params": {"value": 1}
        }))
        .unwrap();
        assert_eq!(
            frame,
            Frame::Request {
                id: RequestId::Number(7),
                method: "askServer".to_string(),
                params: Some(json!({"value": 1})),
            }
        );
    }

    #[test]
    fn test_parse_request_with_string_id() {
        let frame = Frame::parse(json!({"jsonrpc": "2.0", "id": "a-1", "method": "m"})).unwrap();
        assert_eq!(
            frame,
            Frame::Request {
                id: RequestId::Text("a-1".to_string()),
                method: "m".to_string(),
                params: None,
            }
        );
    }

    #[test]
    fn test_parse_notification() {
        let frame =
            Frame::parse(json!({"jsonrpc": "2.0", "method": "myNotification"})).unwrap();
        assert_eq!(
            frame,
            Frame::Notification {
                method: "myNotification".to_string(),
                params: None,
            }
        );
    }

    #[test]
    fn test_parse_cancel_notification() {
        let frame = Frame::parse(json!({
            "jsonrpc": "2.0",
            "method": CANCEL_METHOD,
            "params": {"id": 12}
        }))
        .unwrap();
        assert_eq!(
            frame,
            Frame::Cancel {
                id: RequestId::Number(12)
            }
        );
    }

    #[test]
    fn test_parse_response_and_error() {
        let frame =
            Frame::parse(json!({"jsonrpc": "2.0", "id": 3, "result": "done"})).unwrap();
        assert_eq!(
            frame,
            Frame::Response {
                id: RequestId::Number(3),
                result: json!("done"),
            }
        );

        let frame = Frame::parse(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": error_codes::METHOD_NOT_FOUND, "message": "nope"}
        }))
        .unwrap();
        match frame {
            Frame::Error { id, error } => {
                assert_eq!(id, Some(RequestId::Number(3)));
                assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_messages() {
        assert!(Frame::parse(json!("just a string")).is_err());
        assert!(Frame::parse(json!({"jsonrpc": "2.0"})).is_err());
        assert!(Frame::parse(json!({"jsonrpc": "2.0", "method": 42})).is_err());
        assert!(Frame::parse(json!({"jsonrpc": "2.0", "result": 1})).is_err());
        assert!(Frame::parse(json!({"jsonrpc": "2.0", "method": CANCEL_METHOD})).is_err());
    }

    #[test]
    fn test_serialize_omits_absent_params() {
        let frame = Frame::Notification {
            method: "exit".to_string(),
            params: None,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"jsonrpc": "2.0", "method": "exit"})
        );
    }

    #[test]
    fn test_serialize_error_without_id_uses_null() {
        let frame = Frame::Error {
            id: None,
            error: RpcError::new(error_codes::PARSE_ERROR, "bad json"),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": error_codes::PARSE_ERROR, "message": "bad json"}
            })
        );
    }

    #[test]
    fn test_round_trip_through_wire_shape() {
        let frames = vec![
            Frame::Request {
                id: RequestId::Number(1),
                method: "askServer".to_string(),
                params: Some(json!([1, 2, 3])),
            },
            Frame::Notification {
                method: "didChange".to_string(),
                params: Some(json!({"uri": "file:///x"})),
            },
            Frame::Response {
                id: RequestId::Text("r".to_string()),
                result: json!(null),
            },
            Frame::Cancel {
                id: RequestId::Number(9),
            },
        ];
        for frame in frames {
            let value = serde_json::to_value(&frame).unwrap();
            assert_eq!(Frame::parse(value).unwrap(), frame);
        }
    }
}
