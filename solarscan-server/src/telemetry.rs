//! Tracing subscriber setup shared by the binaries

use solarscan_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    // A subscriber may already be installed (tests, embedding)
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
