// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value model shared by every layer of the JSON-RPC engine:
//! the wire envelope (`Frame`), request ids, protocol error objects,
//! the `Either` union used for ambiguous wire shapes, and the
//! synchronous future primitive that pending requests resolve through.

pub mod either;
pub mod errors;
pub mod future;
pub mod message;

pub use either::{decode_either, Either};
pub use errors::{error_codes, RpcError, UnionError};
pub use future::{RequestFuture, RpcFuture};
pub use message::{Frame, FrameError, RequestId, CANCEL_METHOD, JSONRPC_VERSION};
