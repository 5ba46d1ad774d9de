// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wires a local service and a remote proxy to a duplex byte stream:
//! `Content-Length` framing, pending-request correlation, outgoing call
//! primitives, and the launcher that runs the read/dispatch loop.

pub mod frames;
pub mod launcher;
pub mod pending;
pub mod proxy;

pub use frames::{FrameReader, FrameWriter};
pub use launcher::{Launcher, LauncherConfig, LauncherError};
pub use pending::PendingRequestTable;
pub use proxy::{RemoteEndpoint, RequestHandle};
