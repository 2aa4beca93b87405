//! `delayq-core` — configuration and error types shared by the delayq crates.

pub mod config;
pub mod error;

pub use config::{DelayqConfig, SchedulerConfig};
pub use error::{DelayqError, Result};
