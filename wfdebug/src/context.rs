//! Cancellation and deadline propagation for remote calls
//!
//! Every call the engine makes against a [`crate::client::WorkflowClient`]
//! goes through [`CallContext::call`], which races the call against the
//! caller's cancellation token and deadline.

use crate::error::{ClientError, DiagError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-supplied cancellation and deadline for one top-level operation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    /// Set an absolute deadline
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use an existing cancellation token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token observed by this context
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every call made through this context (and its clones)
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run one remote call under this context
    ///
    /// Client errors are wrapped as [`DiagError::Remote`] naming `operation`.
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ClientError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DiagError::Cancelled {
                operation: operation.to_string(),
            });
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(DiagError::Cancelled {
                    operation: operation.to_string(),
                }),
                res = fut => res.map_err(|e| DiagError::remote(operation, e)),
            }
        };

        match self.deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(DiagError::DeadlineExceeded {
                        operation: operation.to_string(),
                    });
                }
                match tokio::time::timeout_at(deadline, guarded).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DiagError::DeadlineExceeded {
                        operation: operation.to_string(),
                    }),
                }
            }
            None => guarded.await,
        }
    }
}
