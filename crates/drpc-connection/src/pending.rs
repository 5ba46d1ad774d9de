// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Correlates outgoing request ids with the futures their callers wait on.
//!
//! Registered by callers, resolved or failed by the read loop; the map is
//! guarded by a mutex since the two sides race. Stray frames for ids that
//! were never registered (or already completed) are logged no-ops, so a
//! duplicate or post-cancellation response cannot crash the loop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use log::{trace, warn};
use serde_json::Value;

use drpc_core::{RequestId, RpcError, RpcFuture};

struct PendingEntry {
    future: RpcFuture,
    created: SystemTime,
}

#[derive(Default)]
pub struct PendingRequestTable {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        PendingRequestTable::default()
    }

    /// Creates and stores a pending entry for the given id.
    ///
    /// Ids are allocated monotonically per connection, so an id collision
    /// means a caller bug; the returned future is failed immediately rather
    /// than clobbering the outstanding entry.
    pub fn register(&self, id: RequestId) -> RpcFuture {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&id) {
            warn!("request id {id} is already in flight");
            return RpcFuture::failed(RpcError::internal_error(format!(
                "request id {id} is already in flight"
            )));
        }
        let future = RpcFuture::new();
        entries.insert(
            id,
            PendingEntry {
                future: future.clone(),
                created: SystemTime::now(),
            },
        );
        future
    }

    /// Completes the matching future with the peer's result.
    pub fn resolve(&self, id: &RequestId, result: Value) {
        match self.remove(id) {
            Some(entry) => {
                trace!(
                    "request {id} completed in {:?}",
                    entry.created.elapsed().unwrap_or_default()
                );
                entry.future.complete(Ok(result));
            }
            None => trace!("discarding response for unknown request {id}"),
        }
    }

    /// Fails the matching future with the peer's error object.
    pub fn fail(&self, id: &RequestId, error: RpcError) {
        match self.remove(id) {
            Some(entry) => {
                entry.future.complete(Err(error));
            }
            None => trace!("discarding error response for unknown request {id}"),
        }
    }

    /// Cancels a pending request locally. Returns true if an entry was
    /// outstanding; a later response for the id is then discarded through
    /// the unknown-id path.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.remove(id) {
            Some(entry) => {
                entry.future.complete(Err(RpcError::request_cancelled()));
                true
            }
            None => false,
        }
    }

    /// Fails every remaining entry; called on connection teardown so no
    /// caller hangs past stream closure.
    pub fn fail_all(&self, error: RpcError) {
        let mut entries = self.entries.lock().unwrap();
        for (id, entry) in entries.drain() {
            trace!("failing pending request {id}: {error}");
            entry.future.complete(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn remove(&self, id: &RequestId) -> Option<PendingEntry> {
        self.entries.lock().unwrap().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drpc_core::error_codes;
    use serde_json::json;

    #[test]
    fn test_register_and_resolve() {
        let table = PendingRequestTable::new();
        let future = table.register(RequestId::Number(1));
        assert_eq!(table.len(), 1);

        table.resolve(&RequestId::Number(1), json!("done"));
        assert_eq!(future.wait(), Ok(json!("done")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_fail_carries_the_error_object() {
        let table = PendingRequestTable::new();
        let future = table.register(RequestId::Number(2));
        table.fail(
            &RequestId::Number(2),
            RpcError::new(error_codes::INVALID_PARAMS, "bad"),
        );
        let err = future.wait().unwrap_err();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_unknown_id_is_a_no_op() {
        let table = PendingRequestTable::new();
        table.resolve(&RequestId::Number(99), json!(null));
        table.fail(&RequestId::Number(99), RpcError::internal_error("x"));
        assert!(!table.cancel(&RequestId::Number(99)));
    }

    #[test]
    fn test_cancel_then_late_response_is_discarded() {
        let table = PendingRequestTable::new();
        let future = table.register(RequestId::Number(3));
        assert!(table.cancel(&RequestId::Number(3)));

        let err = future.wait().unwrap_err();
        assert!(err.is_cancellation());

        // The peer responds anyway; the entry is gone, so nothing happens.
        table.resolve(&RequestId::Number(3), json!("late"));
        assert!(future.wait().unwrap_err().is_cancellation());
    }

    #[test]
    fn test_fail_all_drains_the_table() {
        let table = PendingRequestTable::new();
        let a = table.register(RequestId::Number(4));
        let b = table.register(RequestId::Text("x".to_string()));

        table.fail_all(RpcError::connection_closed());
        assert!(table.is_empty());
        assert_eq!(a.wait().unwrap_err().code, error_codes::CONNECTION_CLOSED);
        assert_eq!(b.wait().unwrap_err().code, error_codes::CONNECTION_CLOSED);
    }

    #[test]
    fn test_duplicate_registration_fails_the_new_future() {
        let table = PendingRequestTable::new();
        let first = table.register(RequestId::Number(5));
        let second = table.register(RequestId::Number(5));
        assert!(!first.is_complete());
        assert_eq!(
            second.wait().unwrap_err().code,
            error_codes::INTERNAL_ERROR
        );
        assert_eq!(table.len(), 1);
    }
}
