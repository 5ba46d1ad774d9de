// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reflection-free method dispatch: a service declares its operations once
//! through [`ServiceBuilder`], producing an immutable [`MethodRegistry`];
//! the registry-driven [`GenericEndpoint`] then dispatches inbound requests
//! and notifications by wire name.

pub mod endpoint;
pub mod registry;

pub use endpoint::{CancelSignal, Endpoint, GenericEndpoint, UnknownMethodPolicy};
pub use registry::{ConfigurationError, MethodKind, MethodRegistry, ServiceBuilder};
