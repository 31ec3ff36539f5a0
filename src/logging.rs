//! Diagnostic logging for the binary.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
pub fn default_directive(debug: bool) -> &'static str {
    if debug { "mygem=debug" } else { "warn" }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays pipeable.
///
/// `RUST_LOG` takes precedence over `--debug`. Calling this twice is harmless.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
