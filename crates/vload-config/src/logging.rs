//! Structured logging utilities for vload components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use vload_config::{log_fetch_info, log_shim_error};
//!
//! log_fetch_info!("Local copy found", path = "id1/gfx.wad", size = 1024);
//! log_shim_error!("Unknown descriptor", fd = 7);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const FETCH: &'static str = "FETCH";
    pub const WRITEBACK: &'static str = "WRITEBACK";
    pub const SHIM: &'static str = "SHIM";
    pub const STORE: &'static str = "STORE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === FETCH logging macros ===

#[macro_export]
macro_rules! log_fetch_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "FETCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fetch_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "FETCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fetch_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "FETCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fetch_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "FETCH", $($key = $value,)* $msg)
    };
}

// === WRITEBACK logging macros ===

#[macro_export]
macro_rules! log_writeback_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "WRITEBACK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_writeback_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "WRITEBACK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_writeback_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "WRITEBACK", $($key = $value,)* $msg)
    };
}

// === SHIM logging macros ===

#[macro_export]
macro_rules! log_shim_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "SHIM", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shim_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SHIM", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shim_trace {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::trace!(component = "SHIM", $($key = $value,)* $msg)
    };
}

// === STORE logging macros ===

#[macro_export]
macro_rules! log_store_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "STORE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_store_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "STORE", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `env_var` names an override variable checked before `RUST_LOG`.
pub fn init_logging(level: LogLevel, env_var: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let env_filter = env_var
        .and_then(|name| EnvFilter::try_from_env(name).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_filter()));

    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
