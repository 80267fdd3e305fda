//! Append-only JSON Lines audit log of dispatches.
//!
//! One record per completed dispatch. Write failures are logged and
//! otherwise ignored.

use super::fields::truncate_prompt;
use crate::config::AuditConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    /// Backend that produced the response, if any
    pub backend: Option<String>,
    pub prompt_length: usize,
    /// Only populated with content logging enabled
    pub prompt_preview: Option<String>,
    pub response_length: usize,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AuditRecord {
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub struct AuditLog {
    path: Option<PathBuf>,
    enable_content_logging: bool,
    /// Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(config: &AuditConfig, enable_content_logging: bool) -> Self {
        Self {
            path: config.path.clone(),
            enable_content_logging,
            write_lock: Mutex::new(()),
        }
    }

    /// An audit log that only traces.
    pub fn disabled() -> Self {
        Self::new(&AuditConfig::default(), false)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Build a record for one dispatch.
    pub fn entry(
        &self,
        request_id: &str,
        backend: Option<&str>,
        prompt: &str,
        response: Option<&str>,
        latency: Duration,
        success: bool,
    ) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            backend: backend.map(str::to_string),
            prompt_length: prompt.chars().count(),
            prompt_preview: truncate_prompt(prompt, self.enable_content_logging),
            response_length: response.map(|r| r.chars().count()).unwrap_or(0),
            latency_ms: latency.as_millis() as u64,
            success,
            metadata: Map::new(),
        }
    }

    /// Append a record.
    pub async fn record(&self, record: &AuditRecord) {
        tracing::debug!(
            request_id = %record.request_id,
            backend = record.backend.as_deref().unwrap_or("-"),
            latency_ms = record.latency_ms,
            success = record.success,
            "Dispatch audited"
        );

        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.append(path, record).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write audit record");
        }
    }

    async fn append(&self, path: &Path, record: &AuditRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }
}
