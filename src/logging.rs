use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

/// Filter used for `--verbose`.
pub const VERBOSE_FILTER: &str = "warn,framefetch_lib=debug,framefetch=debug";

/// Initialize structured logging on stderr; stdout carries the JSON response.
///
/// `RUST_LOG` wins over both defaults. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
