//! The seam between the cascade and concrete providers.

use super::DispatchRequest;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single backend invocation.
///
/// None of these reach dispatch callers; they are recorded against the
/// backend and the cascade moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend '{backend}' timed out after {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("Backend '{0}' is unavailable")]
    Unavailable(String),

    #[error("Backend '{backend}' failed: {message}")]
    Failed { backend: String, message: String },

    #[error("Backend '{0}' returned an empty response")]
    EmptyResponse(String),
}

impl BackendError {
    pub fn failed(backend: &str, message: impl Into<String>) -> Self {
        BackendError::Failed {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(backend: &str, timeout: Duration) -> Self {
        BackendError::Timeout {
            backend: backend.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }
}

/// A provider the cascade can delegate a request to.
///
/// Implementations decide what is sent where; the cascade only needs a
/// stable name, a cheap local availability check and the call itself.
#[async_trait]
pub trait BackendHandler: Send + Sync + 'static {
    /// Stable identifier used for ordering, health and connectivity records.
    fn name(&self) -> &str;

    /// Local precondition check (binary installed, API key present, ...).
    ///
    /// Must not perform I/O against the provider.
    fn is_available(&self) -> bool {
        true
    }

    /// Perform the call. The cascade bounds it with the configured timeout.
    async fn invoke(&self, request: &DispatchRequest) -> Result<String, BackendError>;
}

pub type SharedBackend = Arc<dyn BackendHandler>;
