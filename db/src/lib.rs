mod algorithm;
pub mod cli;
mod clock;
mod engine;
pub mod errors;
pub mod server;

use tracing_subscriber::EnvFilter;

/// Installs the global log/trace subscriber. `RUST_LOG` wins over the
/// configured level; calling this twice is a no-op.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
