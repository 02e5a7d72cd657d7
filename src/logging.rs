//! Thin logging helpers over the `log` facade. The crate never chooses a
//! backend; binaries embedding it call [`init_logger`] (or initialize their
//! own subscriber) before starting the coordinator.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes `env_logger` from the `RUST_LOG` environment variable.
/// Intended for test and example binaries; production embedders may prefer
/// to initialize their own backend instead.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Logs an error-level message tagged with a node address.
pub fn log_error(node: u16, message: &str) {
    if log_enabled!(Level::Error) {
        error!("[{node:#06x}] {message}");
    }
}

/// Logs a warning-level message tagged with a node address.
pub fn log_warn(node: u16, message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("[{node:#06x}] {message}");
    }
}

/// Logs an info-level message tagged with a node address.
pub fn log_info(node: u16, message: &str) {
    if log_enabled!(Level::Info) {
        info!("[{node:#06x}] {message}");
    }
}

/// Logs a debug-level message tagged with a node address.
pub fn log_debug(node: u16, message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("[{node:#06x}] {message}");
    }
}
