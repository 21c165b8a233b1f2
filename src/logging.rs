use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Safe to call more than once;
/// an already-installed subscriber is kept.
pub fn init_logging(level: &str, json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer().with_target(true).with_filter(filter).boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}
