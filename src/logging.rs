//! Tracing setup. `RUST_LOG` wins over the configured filter; the
//! `logs-json` feature switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(default_filter: &str) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_target(true);

    #[cfg(feature = "logs-json")]
    let result = builder.json().try_init();
    #[cfg(not(feature = "logs-json"))]
    let result = builder.try_init();

    result.is_ok()
}
