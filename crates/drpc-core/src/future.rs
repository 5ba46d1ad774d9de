// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared-state future for the thread-per-handler execution model.
//!
//! A `RpcFuture` is cloneable; every clone sees the same completion. The
//! first completion wins, later ones are no-ops (a response arriving after
//! local cancellation is simply discarded).

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::RpcError;

type Completion = Result<Value, RpcError>;

struct Shared {
    state: Mutex<Option<Completion>>,
    ready: Condvar,
}

#[derive(Clone)]
pub struct RpcFuture {
    shared: Arc<Shared>,
}

impl RpcFuture {
    pub fn new() -> Self {
        RpcFuture {
            shared: Arc::new(Shared {
                state: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// A future that already holds the given completion.
    pub fn completed(result: Completion) -> Self {
        let future = RpcFuture::new();
        future.complete(result);
        future
    }

    pub fn failed(error: RpcError) -> Self {
        RpcFuture::completed(Err(error))
    }

    /// Completes the future. Returns false if it was already complete,
    /// in which case the new result is discarded.
    pub fn complete(&self, result: Completion) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.is_some() {
            return false;
        }
        *state = Some(result);
        self.shared.ready.notify_all();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.shared.state.lock().unwrap().is_some()
    }

    /// Non-blocking probe for the completion.
    pub fn try_result(&self) -> Option<Completion> {
        self.shared.state.lock().unwrap().clone()
    }

    /// Blocks the calling thread until the future completes.
    pub fn wait(&self) -> Completion {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(result) = state.as_ref() {
                return result.clone();
            }
            state = self.shared.ready.wait(state).unwrap();
        }
    }

    /// Blocks up to `timeout`; returns None if the future is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(result) = state.as_ref() {
                return Some(result.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, timed_out) = self.shared.ready.wait_timeout(state, remaining).unwrap();
            state = guard;
            if timed_out.timed_out() && state.is_none() {
                return None;
            }
        }
    }
}

impl Default for RpcFuture {
    fn default() -> Self {
        RpcFuture::new()
    }
}

/// Typed view over a raw future: decodes the result value on access.
pub struct RequestFuture<R> {
    raw: RpcFuture,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> RequestFuture<R> {
    pub fn new(raw: RpcFuture) -> Self {
        RequestFuture {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn wait(&self) -> Result<R, RpcError> {
        decode(self.raw.wait())
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, RpcError>> {
        self.raw.wait_timeout(timeout).map(decode)
    }

    pub fn is_complete(&self) -> bool {
        self.raw.is_complete()
    }

    pub fn raw(&self) -> &RpcFuture {
        &self.raw
    }
}

fn decode<R: DeserializeOwned>(completion: Completion) -> Result<R, RpcError> {
    let value = completion?;
    serde_json::from_value(value)
        .map_err(|err| RpcError::internal_error(format!("failed to decode response: {err}")))
}
