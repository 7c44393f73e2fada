// src/nat/wait.rs
//! Bounded waits with the timeout visible in the result type.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time::timeout;

use crate::nat::error::{UceError, UceResult};

/// Outcome of a bounded wait
#[derive(Debug)]
pub enum Wait<T> {
    /// Operation completed in time
    Ready(T),

    /// Bound elapsed first
    TimedOut(Duration),

    /// Operation failed before the bound
    Failed(io::Error),
}

/// Run `operation` for at most `limit`
pub async fn bounded<F, T>(limit: Duration, operation: F) -> Wait<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, operation).await {
        Ok(Ok(value)) => Wait::Ready(value),
        Ok(Err(e)) => Wait::Failed(e),
        Err(_) => Wait::TimedOut(limit),
    }
}

impl<T> Wait<T> {
    /// Timeout becomes [`UceError::Timeout`]
    pub fn into_result(self) -> UceResult<T> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::TimedOut(limit) => Err(UceError::Timeout(limit)),
            Self::Failed(e) => Err(UceError::Io(e)),
        }
    }

    /// Timeout becomes `Ok(None)`, for best-effort waits
    pub fn into_option(self) -> UceResult<Option<T>> {
        match self {
            Self::Ready(value) => Ok(Some(value)),
            Self::TimedOut(_) => Ok(None),
            Self::Failed(e) => Err(UceError::Io(e)),
        }
    }

    /// Whether the bound elapsed
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}
