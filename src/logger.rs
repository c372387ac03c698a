use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Set up the global subscriber. RUST_LOG takes precedence, otherwise the
// level depends on the build and `verbose` raises it to at least debug
pub fn init_logging(verbose: bool) {
    let level = default_level(verbose);

    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(level), false),
    };

    let fmt_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    if !from_env {
        debug!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}

fn default_level(verbose: bool) -> &'static str {
    if cfg!(debug_assertions) {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}
