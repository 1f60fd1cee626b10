//! Tracing setup
//!
//! Level is chosen in this order:
//! 1. `--verbose`: debug for this crate
//! 2. `RUST_LOG`
//! 3. warnings only

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "swift_package_info=debug";
const DEFAULT_FILTER: &str = "swift_package_info=warn";

/// Initialize the global subscriber. Call once, before any logging.
pub fn init(verbose: bool) {
    let filter = build_filter(verbose);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    // A second init (tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn build_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
