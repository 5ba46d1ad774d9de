// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The runtime dispatch target.
//!
//! `GenericEndpoint` resolves method names through the registry. Request
//! handlers run on their own thread so the read loop never blocks on them;
//! notification handlers run inline, keeping their dispatch strictly in
//! frame-arrival order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, trace};
use serde_json::Value;

use drpc_core::{RpcError, RpcFuture};

use crate::registry::{Handler, MethodRegistry};

/// Cooperative cancellation flag handed to in-flight request handlers.
///
/// Cancelling is advisory: a handler that never checks the signal runs to
/// completion and its response is still sent.
#[derive(Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        CancelSignal::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What to do with a notification naming an unknown method.
///
/// The source protocol stacks disagree here (some drop silently, some
/// raise), so the behavior is configuration rather than a fixed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMethodPolicy {
    /// Log at trace level and drop the notification.
    #[default]
    Ignore,
    /// Surface a MethodNotFound error to the local caller (the read loop
    /// logs it; there is no response channel to the peer).
    Fail,
}

/// Accepts (method, parameter) pairs: requests yield a future, notifications
/// fire and forget. Any implementation may substitute for the generic one,
/// e.g. a hand-written endpoint or a forwarder to another connection.
pub trait Endpoint: Send + Sync {
    fn request(&self, method: &str, params: Option<Value>, cancel: CancelSignal) -> RpcFuture;

    fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcError>;
}

/// Registry-driven endpoint. Holds no mutable state beyond the immutable
/// registry; handler side effects belong to the bound service.
pub struct GenericEndpoint {
    registry: Arc<MethodRegistry>,
    fallback: Option<Arc<dyn Endpoint>>,
    unknown_notification_policy: UnknownMethodPolicy,
}

impl GenericEndpoint {
    pub fn new(registry: MethodRegistry) -> Self {
        GenericEndpoint {
            registry: Arc::new(registry),
            fallback: None,
            unknown_notification_policy: UnknownMethodPolicy::default(),
        }
    }

    /// Installs a delegate endpoint that receives calls the registry does
    /// not resolve, instead of failing them with MethodNotFound.
    pub fn with_fallback(mut self, fallback: Arc<dyn Endpoint>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_unknown_notification_policy(mut self, policy: UnknownMethodPolicy) -> Self {
        self.unknown_notification_policy = policy;
        self
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }
}

impl Endpoint for GenericEndpoint {
    fn request(&self, method: &str, params: Option<Value>, cancel: CancelSignal) -> RpcFuture {
        match self.registry.lookup(method) {
            Some(Handler::Request(_)) => {
                let future = RpcFuture::new();
                let completer = future.clone();
                let registry = Arc::clone(&self.registry);
                let method = method.to_string();
                thread::spawn(move || {
                    if let Some(Handler::Request(thunk)) = registry.lookup(&method) {
                        completer.complete(invoke_request(&method, thunk, params, cancel));
                    }
                });
                future
            }
            Some(Handler::Notification(_)) => RpcFuture::failed(RpcError::invalid_request(
                format!("method '{method}' is registered as a notification"),
            )),
            None => match &self.fallback {
                Some(fallback) => fallback.request(method, params, cancel),
                None => RpcFuture::failed(RpcError::method_not_found(method)),
            },
        }
    }

    fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcError> {
        match self.registry.lookup(method) {
            Some(Handler::Notification(thunk)) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| thunk(params))) {
                    error!(
                        "notification handler '{method}' panicked: {}",
                        panic_message(&*payload)
                    );
                }
                Ok(())
            }
            // A notification naming a request-kind method: invoke it and
            // discard the result, there is no response channel.
            Some(Handler::Request(_)) => {
                let registry = Arc::clone(&self.registry);
                let method = method.to_string();
                thread::spawn(move || {
                    if let Some(Handler::Request(thunk)) = registry.lookup(&method) {
                        if let Err(err) =
                            invoke_request(&method, thunk, params, CancelSignal::new())
                        {
                            error!("notification '{method}' failed: {err}");
                        }
                    }
                });
                Ok(())
            }
            None => match &self.fallback {
                Some(fallback) => fallback.notify(method, params),
                None => match self.unknown_notification_policy {
                    UnknownMethodPolicy::Ignore => {
                        trace!("ignoring notification for unknown method '{method}'");
                        Ok(())
                    }
                    UnknownMethodPolicy::Fail => Err(RpcError::method_not_found(method)),
                },
            },
        }
    }
}

fn invoke_request(
    method: &str,
    thunk: &crate::registry::RequestThunk,
    params: Option<Value>,
    cancel: CancelSignal,
) -> Result<Value, RpcError> {
    match panic::catch_unwind(AssertUnwindSafe(|| thunk(params, cancel))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&*payload);
            error!("request handler '{method}' panicked: {message}");
            Err(RpcError::internal_error(format!(
                "handler for '{method}' panicked: {message}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
