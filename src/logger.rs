use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Logs go to stderr, stdout only carries the dashboard
pub fn init_logging() {
    let level = if cfg!(debug_assertions) { "debug" } else { "warn" };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::new(level),
    };

    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    debug!("Logging initialized");
}
