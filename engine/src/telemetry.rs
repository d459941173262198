//! Telemetry and Observability
//!
//! Wires up `tracing-subscriber` for structured logging. `RUST_LOG` always
//! wins; otherwise the configured level applies to both the global default
//! and this crate's own target. Debug builds print human-readable output,
//! release builds emit JSON lines.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber at the given level.
///
/// Only the first successful installation wins; later calls are no-ops,
/// which keeps repeated initialization (tests, embedding) harmless.
pub fn init_telemetry_with_level(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},valet_engine={log_level}")));

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(debug_assertions)]
    registry
        .with(fmt::layer().pretty().with_target(false))
        .try_init()
        .ok();

    #[cfg(not(debug_assertions))]
    registry
        .with(fmt::layer().json().with_current_span(true))
        .try_init()
        .ok();
}
