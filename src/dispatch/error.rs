//! Errors surfaced to dispatch callers.

use crate::queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Every candidate failed and the request carried no fallback content.
    ///
    /// `attempted` is empty when no backend was eligible, or when an
    /// identical in-flight dispatch already exhausted the backends.
    #[error("All backends exhausted (attempted: {})", attempted.join(", "))]
    Exhausted { attempted: Vec<String> },

    #[error("Queue rejected request: {0}")]
    Queue(#[from] QueueError),

    /// The queued request waited longer than the queue's max wait.
    #[error("Request expired in queue after {waited_ms}ms")]
    QueueTimeout { waited_ms: u64 },

    /// The queue consumer stopped before the request was processed.
    #[error("Queue shut down before request was dispatched")]
    QueueClosed,
}
