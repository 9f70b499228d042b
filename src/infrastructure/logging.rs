//! Logging initialization
//!
//! Console tracing with `RUST_LOG`-style filtering. Defaults to `info` for
//! this crate when no filter is set.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Initialize the global tracing subscriber. Safe to call once per process;
/// repeated calls (e.g. from tests) are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
