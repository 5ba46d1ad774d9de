// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declarative method registration.
//!
//! A `ServiceBuilder` collects the operations a service exposes, including
//! delegated sub-services and `segment/` namespaces, and `build()` flattens
//! them into one lookup table. Duplicate effective names are a configuration
//! error raised here, never at call time. The registry only resolves names;
//! invocation is the endpoint's job.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use drpc_core::RpcError;

use crate::endpoint::CancelSignal;

pub(crate) type RequestThunk =
    Box<dyn Fn(Option<Value>, CancelSignal) -> Result<Value, RpcError> + Send + Sync>;
pub(crate) type NotificationThunk = Box<dyn Fn(Option<Value>) + Send + Sync>;

pub(crate) enum Handler {
    Request(RequestThunk),
    Notification(NotificationThunk),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Request,
    Notification,
}

/// Duplicate method registration is fatal at construction time.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    DuplicateMethod(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::DuplicateMethod(name) => {
                write!(f, "method '{name}' is registered more than once")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Collects the declared operations of a service.
///
/// Parameter decoding and result encoding happen inside the registration
/// wrappers, so the stored thunks form a closed, uniformly typed table with
/// no downcasts at dispatch time.
#[derive(Default)]
pub struct ServiceBuilder {
    entries: Vec<(String, Handler)>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        ServiceBuilder::default()
    }

    /// Registers a request handler taking one parameter.
    pub fn request<P, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        let thunk: RequestThunk = Box::new(move |params, _cancel| {
            let params = decode_params::<P>(params)?;
            encode_result(handler(params)?)
        });
        self.entries.push((name.into(), Handler::Request(thunk)));
        self
    }

    /// Registers a parameterless request handler. A parameter supplied by
    /// the caller is ignored.
    pub fn request0<R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        R: Serialize,
        F: Fn() -> Result<R, RpcError> + Send + Sync + 'static,
    {
        let thunk: RequestThunk =
            Box::new(move |_params, _cancel| encode_result(handler()?));
        self.entries.push((name.into(), Handler::Request(thunk)));
        self
    }

    /// Registers a request handler that also receives the cancellation
    /// signal for cooperative cancellation.
    pub fn cancellable_request<P, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P, CancelSignal) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        let thunk: RequestThunk = Box::new(move |params, cancel| {
            let params = decode_params::<P>(params)?;
            encode_result(handler(params, cancel)?)
        });
        self.entries.push((name.into(), Handler::Request(thunk)));
        self
    }

    /// Registers a notification handler taking one parameter.
    ///
    /// Notifications have no response channel; a payload that fails to
    /// decode is logged and dropped.
    pub fn notification<P, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(P) + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let thunk: NotificationThunk = Box::new(move |params| {
            match decode_params::<P>(params) {
                Ok(params) => handler(params),
                Err(err) => {
                    log::error!("dropping notification '{method}' with bad params: {err}")
                }
            }
        });
        self.entries.push((name, Handler::Notification(thunk)));
        self
    }

    /// Registers a parameterless notification handler. A parameter supplied
    /// by the caller is ignored.
    pub fn notification0<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let thunk: NotificationThunk = Box::new(move |_params| handler());
        self.entries.push((name.into(), Handler::Notification(thunk)));
        self
    }

    /// Merges a delegated sub-service, keeping its operation names as-is.
    pub fn delegate(mut self, sub: ServiceBuilder) -> Self {
        self.entries.extend(sub.entries);
        self
    }

    /// Merges a delegated sub-service under a namespace: every operation
    /// name is prefixed with `segment/`. Nested segments compose.
    pub fn segment(mut self, prefix: &str, sub: ServiceBuilder) -> Self {
        for (name, handler) in sub.entries {
            self.entries.push((format!("{prefix}/{name}"), handler));
        }
        self
    }

    /// Flattens the declared operations into a registry, rejecting
    /// duplicate effective names.
    pub fn build(self) -> Result<MethodRegistry, ConfigurationError> {
        let mut handlers = HashMap::with_capacity(self.entries.len());
        for (name, handler) in self.entries {
            if handlers.insert(name.clone(), handler).is_some() {
                return Err(ConfigurationError::DuplicateMethod(name));
            }
        }
        Ok(MethodRegistry { handlers })
    }
}

/// Immutable name → handler table. Built once per connection, then only
/// read, so concurrent lookups need no locking.
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    pub(crate) fn lookup(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The registered method names and their kinds, for diagnostics.
    pub fn methods(&self) -> impl Iterator<Item = (&str, MethodKind)> {
        self.handlers.iter().map(|(name, handler)| {
            let kind = match handler {
                Handler::Request(_) => MethodKind::Request,
                Handler::Notification(_) => MethodKind::Notification,
            };
            (name.as_str(), kind)
        })
    }
}

fn decode_params<P: DeserializeOwned>(params: Option<Value>) -> Result<P, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|err| RpcError::invalid_params(format!("failed to decode params: {err}")))
}

fn encode_result<R: Serialize>(result: R) -> Result<Value, RpcError> {
    serde_json::to_value(result)
        .map_err(|err| RpcError::internal_error(format!("failed to encode result: {err}")))
}
