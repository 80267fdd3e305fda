//! Audit log configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the append-only dispatch audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON Lines file receiving one record per dispatch.
    /// `None` disables the file sink; records are still traced.
    pub path: Option<PathBuf>,
}
