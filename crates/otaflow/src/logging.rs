//! Logging initialization using tracing

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level` when set. Thread names are included so the
/// update worker's lines can be told apart from request handlers.
pub fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_names(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .init();
    }
}
