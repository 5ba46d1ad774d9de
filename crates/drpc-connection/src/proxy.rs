// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Outgoing call primitives and proxy generation.
//!
//! `RemoteEndpoint` is the shared send path every proxy method funnels
//! through: allocate an id, register it with the pending table, write the
//! frame. Concrete proxy types are generated by [`remote_interface!`] as
//! plain structs of thunks, so there is no runtime proxying.

use std::io::{self, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use drpc_core::{Frame, RequestFuture, RequestId, RpcError};

use crate::frames::FrameWriter;
use crate::pending::PendingRequestTable;

pub(crate) type SharedWriter = Arc<Mutex<FrameWriter<Box<dyn Write + Send>>>>;

pub struct RemoteEndpoint {
    writer: SharedWriter,
    pending: Arc<PendingRequestTable>,
    next_id: AtomicI64,
}

impl RemoteEndpoint {
    pub(crate) fn new(writer: SharedWriter, pending: Arc<PendingRequestTable>) -> Self {
        RemoteEndpoint {
            writer,
            pending,
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Sends a request frame and returns a handle for the correlated
    /// response. The handle's future always completes eventually: with the
    /// peer's result, with a local failure (bad params, write error), or
    /// with ConnectionClosed at teardown.
    pub fn send_request<P, R>(self: &Arc<Self>, method: &str, params: Option<P>) -> RequestHandle<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.allocate_id();
        let future = self.pending.register(id.clone());

        match encode_params(params) {
            Ok(params) => {
                let frame = Frame::Request {
                    id: id.clone(),
                    method: method.to_string(),
                    params,
                };
                if let Err(err) = self.write(&frame) {
                    self.pending.fail(
                        &id,
                        RpcError::internal_error(format!("failed to write request: {err}")),
                    );
                }
            }
            Err(err) => self.pending.fail(&id, err),
        }

        RequestHandle {
            id,
            future: RequestFuture::new(future),
            remote: Arc::clone(self),
        }
    }

    /// Sends a notification frame; fire and forget, no future.
    pub fn send_notification<P: Serialize>(&self, method: &str, params: Option<P>) -> io::Result<()> {
        let params = encode_params(params)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.write(&Frame::Notification {
            method: method.to_string(),
            params,
        })
    }

    /// Cancels a pending request: fails its future locally and, if it was
    /// still outstanding, best-effort notifies the peer.
    pub fn cancel(&self, id: &RequestId) {
        if self.pending.cancel(id) {
            if let Err(err) = self.write(&Frame::Cancel { id: id.clone() }) {
                error!("failed to send cancellation for request {id}: {err}");
            }
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn write(&self, frame: &Frame) -> io::Result<()> {
        self.writer.lock().unwrap().write(frame)
    }
}

fn encode_params<P: Serialize>(params: Option<P>) -> Result<Option<Value>, RpcError> {
    match params {
        None => Ok(None),
        Some(params) => serde_json::to_value(params)
            .map(Some)
            .map_err(|err| RpcError::invalid_params(format!("failed to encode params: {err}"))),
    }
}

/// A typed handle on an outstanding request.
pub struct RequestHandle<R> {
    id: RequestId,
    future: RequestFuture<R>,
    remote: Arc<RemoteEndpoint>,
}

impl<R: DeserializeOwned> RequestHandle<R> {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Blocks until the response, error, or cancellation arrives.
    pub fn wait(&self) -> Result<R, RpcError> {
        self.future.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, RpcError>> {
        self.future.wait_timeout(timeout)
    }

    pub fn is_complete(&self) -> bool {
        self.future.is_complete()
    }

    /// Cancels this request: the local future fails with RequestCancelled
    /// and a `$/cancelRequest` notification is sent to the peer. Cooperative
    /// only; the peer's handler may still run to completion.
    pub fn cancel(&self) {
        self.remote.cancel(&self.id);
    }
}

/// Generates a concrete proxy type for a declared remote interface.
///
/// Each entry becomes a method thunk over the shared send primitives:
/// requests return a [`RequestHandle`], notifications return immediately.
///
/// ```ignore
/// remote_interface! {
///     pub struct BackendProxy {
///         request ask("askServer", AskParams) -> AskResult;
///         request status("sys/status") -> StatusResult;
///         notification did_change("didChange", ChangeParams);
///         notification exit("exit");
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $($body:tt)* }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            remote: std::sync::Arc<$crate::proxy::RemoteEndpoint>,
        }

        impl $name {
            $vis fn new(remote: std::sync::Arc<$crate::proxy::RemoteEndpoint>) -> Self {
                Self { remote }
            }

            $crate::remote_interface!(@methods $vis $($body)*);
        }
    };

    (@methods $vis:vis) => {};

    (@methods $vis:vis
        request $method:ident($wire:literal, $param:ty) -> $result:ty; $($rest:tt)*
    ) => {
        $vis fn $method(&self, params: $param) -> $crate::proxy::RequestHandle<$result> {
            self.remote.send_request($wire, Some(params))
        }
        $crate::remote_interface!(@methods $vis $($rest)*);
    };

    (@methods $vis:vis
        request $method:ident($wire:literal) -> $result:ty; $($rest:tt)*
    ) => {
        $vis fn $method(&self) -> $crate::proxy::RequestHandle<$result> {
            self.remote.send_request::<(), $result>($wire, None)
        }
        $crate::remote_interface!(@methods $vis $($rest)*);
    };

    (@methods $vis:vis
        notification $method:ident($wire:literal, $param:ty); $($rest:tt)*
    ) => {
        $vis fn $method(&self, params: $param) -> std::io::Result<()> {
            self.remote.send_notification($wire, Some(params))
        }
        $crate::remote_interface!(@methods $vis $($rest)*);
    };

    (@methods $vis:vis
        notification $method:ident($wire:literal); $($rest:tt)*
    ) => {
        $vis fn $method(&self) -> std::io::Result<()> {
            self.remote.send_notification::<()>($wire, None)
        }
        $crate::remote_interface!(@methods $vis $($rest)*);
    };
}
