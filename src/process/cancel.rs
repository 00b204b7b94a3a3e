//! Cooperative cancellation shared between callers and the process invoker
//!
//! Clones of a token share state: cancelling any clone wakes every waiter,
//! and cancelling twice is a no-op.

use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

/// Which source stopped an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    DeadlineElapsed,
}

/// Resolves with the first of "caller cancels" and "absolute deadline elapses".
pub async fn stop_signal(token: &CancellationToken, timeout: Duration) -> StopReason {
    tokio::select! {
        _ = token.cancelled() => StopReason::Cancelled,
        _ = tokio::time::sleep(timeout) => StopReason::DeadlineElapsed,
    }
}
