//! The single, flat error kind a `ScavengerRuntime` caller ever has to
//! match on; everything the core scheduler can raise collapses into one
//! of these.

use scavenger_core::Error as CoreError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("scheduling signaled a local fallback but no local code was supplied")]
    NoSurrogatesAvailable,

    #[error(transparent)]
    Scheduling(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to persist profile store: {0}")]
    Persistence(#[from] std::io::Error),
}
