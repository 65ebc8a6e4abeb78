//! Tracing initialization
//!
//! One call at process start; repeated calls (tests, embedded use) are
//! no-ops. `RUST_LOG` controls the filter, defaulting to `info` for the
//! service crates and `warn` elsewhere.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default directive set when `RUST_LOG` is absent.
const DEFAULT_FILTER: &str = "warn,biostudies_search_core=info,biostudies_search_engine=info,biostudies_search_service=info";

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
