//! Initialization state machine shared by every provider operation.
//!
//! `Uninitialized -> Initializing -> Initialized`. A failed attempt returns
//! to `Uninitialized` so the next call retries. Callers that arrive while an
//! attempt is in flight await that same attempt.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use rust_mcp_schema::InitializeResult;
use tracing::debug;

use crate::mcp::error::McpError;

pub type HandshakeOutcome = Result<Arc<InitializeResult>, McpError>;
type HandshakeAttempt = Shared<BoxFuture<'static, HandshakeOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Initialized,
}

enum Phase {
    Uninitialized,
    Initializing {
        generation: u64,
        attempt: HandshakeAttempt,
    },
    Initialized(Arc<InitializeResult>),
}

struct SessionInner {
    phase: Phase,
    next_generation: u64,
}

pub struct SessionState {
    inner: Mutex<SessionInner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                phase: Phase::Uninitialized,
                next_generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SessionPhase {
        match self.lock().phase {
            Phase::Uninitialized => SessionPhase::Uninitialized,
            Phase::Initializing { .. } => SessionPhase::Initializing,
            Phase::Initialized(_) => SessionPhase::Initialized,
        }
    }

    pub fn initialize_result(&self) -> Option<Arc<InitializeResult>> {
        match &self.lock().phase {
            Phase::Initialized(result) => Some(Arc::clone(result)),
            _ => None,
        }
    }

    /// Returns the cached handshake result, joining or starting an attempt
    /// when there is none. `handshake` is only invoked when this call starts
    /// a new attempt.
    pub async fn ensure_initialized<F, Fut>(&self, handshake: F) -> HandshakeOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InitializeResult, McpError>> + Send + 'static,
    {
        let (generation, attempt) = {
            let mut inner = self.lock();
            match &inner.phase {
                Phase::Initialized(result) => return Ok(Arc::clone(result)),
                Phase::Initializing {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                Phase::Uninitialized => {
                    let generation = inner.next_generation;
                    inner.next_generation += 1;
                    let attempt = handshake().map(|result| result.map(Arc::new)).boxed().shared();
                    inner.phase = Phase::Initializing {
                        generation,
                        attempt: attempt.clone(),
                    };
                    debug!(generation, "Starting MCP initialization handshake");
                    (generation, attempt)
                }
            }
        };

        let outcome = attempt.await;

        let mut inner = self.lock();
        let current = matches!(
            &inner.phase,
            Phase::Initializing { generation: current, .. } if *current == generation
        );
        if current {
            inner.phase = match &outcome {
                Ok(result) => Phase::Initialized(Arc::clone(result)),
                Err(err) => {
                    debug!(generation, error = %err, "MCP initialization handshake failed");
                    Phase::Uninitialized
                }
            };
        }
        outcome
    }
}
