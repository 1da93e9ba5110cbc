//! # yrt Utilities
//!
//! Shared helpers for the yrt binaries.
//!
//! The reflection library itself only emits `tracing` events; this crate
//! installs the subscriber that turns them into console and file output.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_to_dir, init_logging_with, LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
