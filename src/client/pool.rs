//! In-flight read deduplication.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::response::ApiResponse;
use crate::{Error, Result};

pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<ApiResponse>>>;

struct InFlightRequest {
    id: u64,
    response: SharedResponse,
}

/// Removes the pool entry when the shared operation ends, however it ends.
struct EntryGuard {
    requests: Arc<DashMap<String, InFlightRequest>>,
    key: String,
    id: u64,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        self.requests.remove_if(&self.key, |_, entry| entry.id == self.id);
    }
}

/// Concurrent identical reads share one network call.
///
/// The shared call runs as its own task, so it keeps going when any single
/// waiter gives up. The entry only lives while that task runs; a later
/// request with the same key starts a fresh call.
#[derive(Default)]
pub struct RequestPool {
    requests: Arc<DashMap<String, InFlightRequest>>,
    next_id: AtomicU64,
}

impl RequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call for `key`, or start one with `start`.
    ///
    /// Returns the shared response and whether an existing call was joined.
    pub(crate) fn join_or_start<F>(&self, key: &str, start: F) -> (SharedResponse, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<ApiResponse>>,
    {
        let mut entry = match self.requests.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(key, "Joining in-flight request");
                return (entry.get().response.clone(), true);
            }
            Entry::Vacant(entry) => entry,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = EntryGuard {
            requests: self.requests.clone(),
            key: entry.key().clone(),
            id,
        };
        let operation = start();
        let task = tokio::spawn(async move {
            let _guard = guard;
            operation.await
        });

        let response = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Internal(format!("request task failed: {e}"))))
        }
        .boxed()
        .shared();

        entry.insert(InFlightRequest {
            id,
            response: response.clone(),
        });
        (response, false)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.requests.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Forget all in-flight entries. Running calls finish for their current
    /// waiters but are no longer joinable.
    pub fn clear(&self) {
        self.requests.clear();
    }
}
