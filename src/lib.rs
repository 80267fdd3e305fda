//! Switchyard - backend dispatch and resilience layer
//!
//! Routes work to one of several interchangeable backends behind a cache,
//! a request deduplicator, connectivity and health tracking, and an ordered
//! failover cascade.
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard::config::SwitchyardConfig;
//! use switchyard::dispatch::{DispatchRequest, Dispatcher, SharedBackend};
//!
//! # async fn run(backends: Vec<SharedBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SwitchyardConfig::load(None)?.with_env_overrides();
//! config.validate()?;
//!
//! let dispatcher = Arc::new(Dispatcher::new(config, backends));
//! let response = dispatcher
//!     .dispatch(&DispatchRequest::new("summarize", "Summarize this diff").with_fallback("n/a"))
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod dedup;
pub mod dispatch;
pub mod fingerprint;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod storage;

pub use config::SwitchyardConfig;
pub use dispatch::{
    BackendError, BackendHandler, DispatchError, DispatchRequest, DispatchResponse, Dispatcher,
    ResponseSource,
};
