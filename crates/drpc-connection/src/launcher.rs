// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The composition root for one connection.
//!
//! A launcher binds a method registry (the local service), an input stream
//! and an output stream, and runs the read loop: frames are read one at a
//! time in arrival order and classified; requests are dispatched through the
//! endpoint with the response written whenever the handler finishes;
//! responses feed the pending-request table. Malformed frames are logged and
//! skipped. End-of-stream fails all outstanding requests and ends the loop.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{error, info, trace};
use serde_json::Value;

use drpc_core::{Frame, RequestId, RpcError};
use drpc_dispatch::{CancelSignal, Endpoint, GenericEndpoint, MethodRegistry, UnknownMethodPolicy};

use crate::frames::{FrameReader, FrameWriter};
use crate::pending::PendingRequestTable;
use crate::proxy::{RemoteEndpoint, SharedWriter};

#[derive(Debug, Clone, Default)]
pub struct LauncherConfig {
    pub unknown_notification_policy: UnknownMethodPolicy,
    /// Log every inbound frame at trace level.
    pub trace_frames: bool,
}

// Connection lifecycle: Idle -> Listening -> Closed, never backwards.
const STATE_IDLE: u8 = 0;
const STATE_LISTENING: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug)]
pub enum LauncherError {
    /// `listen` may be invoked at most once per launcher.
    AlreadyListening,
    Io(io::Error),
}

impl std::fmt::Display for LauncherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LauncherError::AlreadyListening => {
                write!(f, "the launcher is already listening on this connection")
            }
            LauncherError::Io(err) => write!(f, "connection i/o failure: {err}"),
        }
    }
}

impl std::error::Error for LauncherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LauncherError::Io(err) => Some(err),
            _ => None,
        }
    }
}

pub struct Launcher {
    endpoint: Arc<dyn Endpoint>,
    remote: Arc<RemoteEndpoint>,
    pending: Arc<PendingRequestTable>,
    writer: SharedWriter,
    reader: Mutex<Option<FrameReader<Box<dyn BufRead + Send>>>>,
    in_flight: Mutex<HashMap<RequestId, CancelSignal>>,
    state: AtomicU8,
    config: LauncherConfig,
}

impl Launcher {
    /// Builds a launcher hosting the given service over the stream pair.
    pub fn new(
        registry: MethodRegistry,
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Arc<Launcher> {
        Launcher::with_config(registry, input, output, LauncherConfig::default())
    }

    pub fn with_config(
        registry: MethodRegistry,
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
        config: LauncherConfig,
    ) -> Arc<Launcher> {
        let endpoint = GenericEndpoint::new(registry)
            .with_unknown_notification_policy(config.unknown_notification_policy);
        Launcher::with_endpoint(Arc::new(endpoint), input, output, config)
    }

    /// Builds a launcher around a caller-provided endpoint; anything
    /// satisfying the `Endpoint` contract can stand in for the generic one.
    pub fn with_endpoint(
        endpoint: Arc<dyn Endpoint>,
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
        config: LauncherConfig,
    ) -> Arc<Launcher> {
        let writer: SharedWriter = Arc::new(Mutex::new(FrameWriter::new(
            Box::new(output) as Box<dyn Write + Send>
        )));
        let pending = Arc::new(PendingRequestTable::new());
        let remote = Arc::new(RemoteEndpoint::new(
            Arc::clone(&writer),
            Arc::clone(&pending),
        ));
        Arc::new(Launcher {
            endpoint,
            remote,
            pending,
            writer,
            reader: Mutex::new(Some(FrameReader::new(
                Box::new(input) as Box<dyn BufRead + Send>
            ))),
            in_flight: Mutex::new(HashMap::new()),
            state: AtomicU8::new(STATE_IDLE),
            config,
        })
    }

    /// The proxy side of the connection, for issuing outgoing calls.
    pub fn remote(&self) -> Arc<RemoteEndpoint> {
        Arc::clone(&self.remote)
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CLOSED
    }

    /// Runs the blocking read loop until the input stream ends.
    ///
    /// Returns `Ok(())` on clean end-of-stream; either way the connection
    /// transitions to Closed and every outstanding pending request fails
    /// with ConnectionClosed.
    pub fn listen(self: &Arc<Self>) -> Result<(), LauncherError> {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_LISTENING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LauncherError::AlreadyListening);
        }
        let mut reader = match self.reader.lock().unwrap().take() {
            Some(reader) => reader,
            None => return Err(LauncherError::AlreadyListening),
        };

        let result = self.run_loop(&mut reader);

        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.pending.fail_all(RpcError::connection_closed());
        result.map_err(LauncherError::Io)
    }

    fn run_loop(
        self: &Arc<Self>,
        reader: &mut FrameReader<Box<dyn BufRead + Send>>,
    ) -> io::Result<()> {
        loop {
            let body = match reader.read()? {
                Some(body) => body,
                None => {
                    info!("input stream closed, shutting down the connection");
                    return Ok(());
                }
            };

            let value: Value = match serde_json::from_slice(&body) {
                Ok(value) => value,
                Err(err) => {
                    error!("dropping unparsable frame: {err}");
                    continue;
                }
            };
            if self.config.trace_frames {
                trace!("received frame: {value}");
            }

            let frame = match Frame::parse(value) {
                Ok(frame) => frame,
                Err(err) => {
                    error!("dropping malformed frame: {err}");
                    continue;
                }
            };

            match frame {
                Frame::Request { id, method, params } => self.handle_request(id, method, params),
                Frame::Cancel { id } => self.handle_cancel(&id),
                Frame::Notification { method, params } => {
                    if let Err(err) = self.endpoint.notify(&method, params) {
                        // No response channel for notifications; log only.
                        error!("notification '{method}' failed: {err}");
                    }
                }
                Frame::Response { id, result } => self.pending.resolve(&id, result),
                Frame::Error {
                    id: Some(id),
                    error,
                } => self.pending.fail(&id, error),
                Frame::Error { id: None, error } => {
                    error!("peer reported an error with no request id: {error}");
                }
            }
        }
    }

    fn handle_request(self: &Arc<Self>, id: RequestId, method: String, params: Option<Value>) {
        let cancel = CancelSignal::new();
        self.in_flight
            .lock()
            .unwrap()
            .insert(id.clone(), cancel.clone());

        let future = self.endpoint.request(&method, params, cancel);

        // The response is written whenever the handler's future completes,
        // possibly interleaved with later frames; the read loop moves on.
        let launcher = Arc::clone(self);
        thread::spawn(move || {
            let result = future.wait();
            launcher.in_flight.lock().unwrap().remove(&id);
            let frame = match result {
                Ok(result) => Frame::Response { id, result },
                Err(error) => Frame::Error {
                    id: Some(id),
                    error,
                },
            };
            if let Err(err) = launcher.writer.lock().unwrap().write(&frame) {
                error!("failed to write response frame: {err}");
            }
        });
    }

    fn handle_cancel(&self, id: &RequestId) {
        match self.in_flight.lock().unwrap().get(id) {
            Some(signal) => {
                trace!("signalling cancellation of in-flight request {id}");
                signal.cancel();
            }
            // Already answered, or never seen; cancellation of nothing.
            None => trace!("cancellation for unknown request {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drpc_dispatch::ServiceBuilder;
    use std::io::Cursor;

    #[test]
    fn test_listen_at_most_once() {
        let registry = ServiceBuilder::new().build().unwrap();
        let launcher = Launcher::new(registry, Cursor::new(Vec::new()), io::sink());

        assert!(launcher.listen().is_ok());
        assert!(launcher.is_closed());
        assert!(matches!(
            launcher.listen(),
            Err(LauncherError::AlreadyListening)
        ));
    }

    #[test]
    fn test_malformed_frames_do_not_stop_the_loop() {
        let garbage = b"this is not json";
        let ping = r#"{"jsonrpc":"2.0","method":"ping"}"#;
        let input = format!(
            "Content-Length: {}\r\n\r\n{}Content-Length: {}\r\n\r\n{}",
            garbage.len(),
            String::from_utf8_lossy(garbage),
            ping.len(),
            ping
        );

        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let registry = ServiceBuilder::new()
            .notification0("ping", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let launcher = Launcher::new(registry, Cursor::new(input.into_bytes()), io::sink());
        launcher.listen().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stray_response_is_discarded_and_loop_continues() {
        // A response for an id that was never registered, followed by a
        // frame that must still be processed.
        let stray = r#"{"jsonrpc":"2.0","id":99,"result":"whose is this"}"#;
        let ping = r#"{"jsonrpc":"2.0","method":"ping"}"#;
        let input = format!(
            "Content-Length: {}\r\n\r\n{}Content-Length: {}\r\n\r\n{}",
            stray.len(),
            stray,
            ping.len(),
            ping
        );

        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let registry = ServiceBuilder::new()
            .notification0("ping", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let launcher = Launcher::new(registry, Cursor::new(input.into_bytes()), io::sink());
        launcher.listen().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eof_fails_outstanding_requests() {
        let registry = ServiceBuilder::new().build().unwrap();
        let launcher = Launcher::new(registry, Cursor::new(Vec::new()), io::sink());
        let handle: crate::proxy::RequestHandle<Value> =
            launcher.remote().send_request("ask", Some(1));

        launcher.listen().unwrap();
        let err = handle.wait().unwrap_err();
        assert_eq!(err.code, drpc_core::error_codes::CONNECTION_CLOSED);
    }
}
