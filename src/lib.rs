pub mod backend;
pub mod breaker;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod processor;
pub mod safety;
pub mod server;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
