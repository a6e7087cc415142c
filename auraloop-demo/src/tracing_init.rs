//! Minimal stdout tracing setup shared by `main` and the example binaries.
//! The reactor crates themselves never install a subscriber; only runnable
//! binaries are allowed to, since installing one is a process-wide,
//! one-shot decision.

use tracing_subscriber::EnvFilter;

/// Installs a compact stdout subscriber. Honors `RUST_LOG` if set,
/// otherwise defaults to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}
