//! Binary-facing assembly layer on top of `scavenger-core`: configuration
//! loading, the public `ScavengerRuntime` entry point, and a tracing
//! installer for applications (never called by the library itself).

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{ConfigError, LocalConfig};
pub use error::RuntimeError;
pub use runtime::ScavengerRuntime;

/// Installs a `tracing-subscriber` `fmt` layer filtered by `RUST_LOG`
/// (falling back to `filter` when unset). Intended for application
/// binaries; a library must not assume it owns the process's logging
/// setup, so `scavenger-core` never calls this.
pub fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}
