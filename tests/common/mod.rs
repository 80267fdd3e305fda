//! Shared test utilities for switchyard integration tests.
//!
//! Provides scripted backends and config builders so each test file only
//! describes the scenario it cares about.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard::config::SwitchyardConfig;
use switchyard::dispatch::{BackendError, BackendHandler, DispatchRequest, SharedBackend};

// =============================================================================
// Scripted Backends
// =============================================================================

/// One scripted reaction to an invocation.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(String),
    Empty,
    Delay(Duration, String),
}

/// A backend that plays back a script, repeating the last step forever.
pub struct ScriptedBackend {
    name: String,
    steps: Mutex<Vec<Step>>,
    available: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps: Mutex::new(steps),
            available: true,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(name: &str, text: &str) -> Arc<Self> {
        Self::new(name, vec![Step::Reply(text.to_string())])
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::new(name, vec![Step::Fail(format!("{} is down", name))])
    }

    pub fn slow(name: &str, delay: Duration, text: &str) -> Arc<Self> {
        Self::new(name, vec![Step::Delay(delay, text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.remove(0)
        } else {
            steps.first().cloned().unwrap_or(Step::Empty)
        }
    }
}

#[async_trait]
impl BackendHandler for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn invoke(&self, request: &DispatchRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        match self.next_step() {
            Step::Reply(text) => Ok(text),
            Step::Fail(message) => Err(BackendError::failed(&self.name, message)),
            Step::Empty => Ok(String::new()),
            Step::Delay(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }
}

/// Erase concrete backend types for `Dispatcher::new`.
pub fn shared(backends: &[Arc<ScriptedBackend>]) -> Vec<SharedBackend> {
    backends
        .iter()
        .map(|b| Arc::clone(b) as SharedBackend)
        .collect()
}

// =============================================================================
// Config Builders
// =============================================================================

/// Default config with every persistent file placed under `dir`.
pub fn persistent_config(dir: &Path) -> SwitchyardConfig {
    let mut config = SwitchyardConfig::default();
    config.connectivity.path = Some(dir.join("connectivity.json"));
    config.cache.dir = Some(dir.join("cache"));
    config.audit.path = Some(dir.join("audit.jsonl"));
    config
}

pub fn request(prompt: &str) -> DispatchRequest {
    DispatchRequest::new("integration", prompt)
}
