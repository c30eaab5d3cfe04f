//! Core gateway error type.

use thiserror::Error;

/// Errors produced by the gateway core.
///
/// Worker crashes are recovered internally by the supervisor and never appear
/// here; callers only observe them as `WorkerUnavailable` on subsequent sends.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The worker process is not running. Retryable once the supervisor has
    /// restarted it.
    #[error("worker process is not running")]
    WorkerUnavailable,

    /// No matching response arrived within the command timeout window.
    #[error("timed out waiting for worker response")]
    CommandTimeout,

    /// The worker answered `success: false`. The worker's error text is
    /// surfaced verbatim and the command is not retried.
    #[error("worker rejected command: {0}")]
    CommandRejected(String),

    /// The connection is not authenticated, or the target resource belongs to
    /// a different user.
    #[error("access denied")]
    Unauthorized,

    /// Unknown resource id.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
