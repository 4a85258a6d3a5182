use tracing_subscriber::{prelude::*, fmt, EnvFilter};

pub fn init_logging() {
    let level = if cfg!(debug_assertions) { "debug" } else { "info" };

    // Honor "RUST_LOG" when set, otherwise use the build level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();
}
