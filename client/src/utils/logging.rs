use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "lumeai=debug,lumeai_lib=info,warn";

/// Filter used with `--verbose`
pub const VERBOSE_FILTER: &str = "lumeai=trace,lumeai_lib=debug,info";

/// Pick the filter directive
///
/// `--verbose` wins over `RUST_LOG`; otherwise `RUST_LOG` is used when set.
pub fn filter_directive(verbose: bool, env: Option<&str>) -> String {
    match (verbose, env) {
        (true, _) => VERBOSE_FILTER.to_string(),
        (false, Some(directive)) if !directive.trim().is_empty() => directive.to_string(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize logging with tracing
///
/// Logs go to stderr so they do not interleave with the chat on stdout.
/// Calling this more than once is harmless.
///
/// # Example
///
/// ```no_run
/// use lumeai_lib::utils::logging::init_logging;
///
/// init_logging(false);
/// ```
pub fn init_logging(verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(verbose, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %directive, "LumeAI logging initialized");
    }
}
