//! Logging facilities for cotcast.
//!
//! cotcast uses the `tracing` crate for instrumentation. To see logs, install
//! a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("cotcast_net=debug,cotcast_core=info")
//!     .init();
//! ```
//!
//! Every event is emitted under one of the [`targets`], so a filter such as
//! `cotcast_core::observer=warn` isolates observer evictions.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "cotcast_core";
    /// Cancel signal target.
    pub const CANCEL: &str = "cotcast_core::cancel";
    /// Observer registry and dispatch target.
    pub const OBSERVER: &str = "cotcast_core::observer";
    /// Multicast channel lifecycle and receive loop target.
    pub const MULTICAST: &str = "cotcast_net::multicast";
}

/// Trace-level event under the [`targets::CORE`] target.
///
/// A thin wrapper around `tracing::trace!`.
#[macro_export]
macro_rules! cotcast_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
