// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved JSON-RPC 2.0 error codes, plus the implementation-defined
/// codes this engine uses for cancellation and connection teardown.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A pending request was cancelled before the peer replied.
    pub const REQUEST_CANCELLED: i64 = -32800;
    /// The connection closed while the request was still outstanding.
    pub const CONNECTION_CLOSED: i64 = -32802;
}

/// The wire error object carried by an error response frame.
///
/// Also used locally: futures that fail without a peer response (cancellation,
/// connection teardown, write failures) fail with one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        RpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("no handler registered for method '{method}'"),
        )
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        RpcError::new(error_codes::INVALID_REQUEST, format!("{detail}"))
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        RpcError::new(error_codes::INVALID_PARAMS, format!("{detail}"))
    }

    pub fn internal_error(detail: impl fmt::Display) -> Self {
        RpcError::new(error_codes::INTERNAL_ERROR, format!("{detail}"))
    }

    pub fn request_cancelled() -> Self {
        RpcError::new(error_codes::REQUEST_CANCELLED, "request was cancelled")
    }

    pub fn connection_closed() -> Self {
        RpcError::new(
            error_codes::CONNECTION_CLOSED,
            "connection closed before a response arrived",
        )
    }

    pub fn is_cancellation(&self) -> bool {
        self.code == error_codes::REQUEST_CANCELLED
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Failures while encoding or decoding an `Either` union.
#[derive(Debug)]
pub enum UnionError {
    /// The disambiguation predicates both matched, or neither matched.
    Ambiguous {
        left_matched: bool,
        right_matched: bool,
    },
    /// The requested side of the union is not the populated one.
    ValueAbsent(&'static str),
    /// The predicate picked a side but structural decoding of it failed.
    Decode(serde_json::Error),
}

impl fmt::Display for UnionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionError::Ambiguous {
                left_matched: true,
                right_matched: true,
            } => write!(f, "both union predicates matched the payload"),
            UnionError::Ambiguous { .. } => {
                write!(f, "neither union predicate matched the payload")
            }
            UnionError::ValueAbsent(side) => {
                write!(f, "the {side} side of the union holds no value")
            }
            UnionError::Decode(err) => write!(f, "failed to decode union value: {err}"),
        }
    }
}

impl std::error::Error for UnionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UnionError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for UnionError {
    fn from(err: serde_json::Error) -> Self {
        UnionError::Decode(err)
    }
}
