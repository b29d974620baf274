//! Infrastructure: configuration loading, logging setup, and retry policy.

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{ConfigError, ConfigLoader};
pub use retry::RetryPolicy;
