// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The built-in demo service hosted by `drpc serve`.
//!
//! A minimal but complete service description: a couple of top-level
//! requests, a notification, and a `sys/` segment delegated to a
//! sub-service.

use log::info;
use serde::{Deserialize, Serialize};

use drpc_core::RpcError;
use drpc_dispatch::{ConfigurationError, MethodRegistry, ServiceBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoParams {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParams {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResult {
    pub sum: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

fn sys_service() -> ServiceBuilder {
    ServiceBuilder::new().request0("info", || {
        Ok(ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    })
}

pub fn build_registry() -> Result<MethodRegistry, ConfigurationError> {
    ServiceBuilder::new()
        .request("echo", |params: EchoParams| Ok(params))
        .request("add", |params: AddParams| {
            params
                .a
                .checked_add(params.b)
                .map(|sum| AddResult { sum })
                .ok_or_else(|| RpcError::invalid_params("sum overflows an i64"))
        })
        .notification("trace", |params: EchoParams| {
            info!("peer says: {}", params.message);
        })
        .segment("sys", sys_service())
        .build()
}
