//! Logging utilities with shelf segment prefixes.
//!
//! The control layer only emits `tracing` events. Native hosts that want them on
//! the terminal enable the `subscriber` feature and call [`init`].

/// Initialize tracing with shelf defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
#[cfg(feature = "subscriber")]
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
#[cfg(feature = "subscriber")]
pub fn init_with_filter(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Segment prefixes for log messages.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
    /// Connection opened
    pub const OPEN: &str = "✿";
    /// Connection closed
    pub const CLOSE: &str = "❀";
}
