//! Requests awaiting an asynchronously delivered reply.
//!
//! Two producers feed the table: the POST path of the HTTP transport and the
//! SSE listener. Whichever resolves an id first wins; later attempts are
//! no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{JsonRpcResponse, RequestId};

type Outcome = Result<JsonRpcResponse, McpError>;

struct PendingEntry {
    sender: oneshot::Sender<Outcome>,
    deadline: Instant,
    timeout: Duration,
}

#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
    /// Set under the entries lock by [`PendingRequests::seal`].
    sealed: AtomicBool,
}

impl PendingRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id` with a deadline of now + `timeout`. Fails with
    /// [`McpError::Closed`] once the table is sealed.
    pub fn register(
        self: &Arc<Self>,
        id: RequestId,
        timeout: Duration,
    ) -> Result<PendingRequest, McpError> {
        let (sender, receiver) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries();
        if self.sealed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }
        if entries.contains_key(&id) {
            return Err(McpError::Session(format!(
                "request id {id} is already pending"
            )));
        }
        entries.insert(
            id,
            PendingEntry {
                sender,
                deadline,
                timeout,
            },
        );
        Ok(PendingRequest {
            id,
            deadline,
            timeout,
            receiver,
            table: Arc::clone(self),
        })
    }

    /// Delivers a response to its waiter. Returns `false` when the id is not
    /// pending (already resolved, failed, evicted, or never registered).
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let id = response.id();
        self.complete(id, Ok(response))
    }

    pub fn fail(&self, id: RequestId, err: McpError) -> bool {
        self.complete(id, Err(err))
    }

    fn complete(&self, id: RequestId, outcome: Outcome) -> bool {
        let Some(entry) = self.entries().remove(&id) else {
            debug!(request_id = id, "Ignoring completion for request that is not pending");
            return false;
        };
        // The waiter may have been dropped; the entry is gone either way.
        let _ = entry.sender.send(outcome);
        true
    }

    /// Fails every entry whose deadline has passed with a timeout.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(RequestId, PendingEntry)> = {
            let mut entries = self.entries();
            let ids: Vec<RequestId> = entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        let count = expired.len();
        for (id, entry) in expired {
            let _ = entry.sender.send(Err(McpError::Timeout {
                id,
                after: entry.timeout,
            }));
        }
        count
    }

    /// Fails every pending entry, e.g. with [`McpError::Closed`] on shutdown.
    pub fn fail_all(&self, err: McpError) -> usize {
        let drained: Vec<PendingEntry> = self.entries().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.sender.send(Err(err.clone()));
        }
        count
    }

    /// Fails every entry with [`McpError::Closed`] and rejects later
    /// registrations.
    pub fn seal(&self) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut entries = self.entries();
            self.sealed.store(true, Ordering::Release);
            entries.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.sender.send(Err(McpError::Closed));
        }
        count
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn remove(&self, id: RequestId) -> bool {
        self.entries().remove(&id).is_some()
    }
}

/// Awaitable handle for one registered id. Dropping it unresolved removes
/// the entry.
pub struct PendingRequest {
    id: RequestId,
    deadline: Instant,
    timeout: Duration,
    receiver: oneshot::Receiver<Outcome>,
    table: Arc<PendingRequests>,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub async fn wait(mut self) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                if !self.table.remove(self.id) {
                    // Resolved between the deadline firing and the removal.
                    if let Ok(outcome) = self.receiver.try_recv() {
                        return outcome;
                    }
                }
                Err(McpError::Timeout {
                    id: self.id,
                    after: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
