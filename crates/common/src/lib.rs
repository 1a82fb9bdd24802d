//! Preserve E2E common library
//!
//! Configuration, authentication, polling, object storage, METS inspection
//! and the typed API client shared by the end-to-end harness.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mets;
pub mod poll;
pub mod storage;

// Re-export commonly used types
pub use api::ApiContext;
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use poll::{poll_until, wait_for_status, Attempt, PollPolicy, StatusMatcher, StatusSource};
pub use storage::{S3Location, S3Transfer};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
