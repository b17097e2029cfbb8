//! Shared utilities for the dgov binaries.

pub mod format;
pub mod logging;

pub use format::{format_duration, format_remaining};
pub use logging::{init_logging, LogFormat, LoggingError};
