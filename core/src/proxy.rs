//! The scheduler's only network-facing dependency. No concrete transport is
//! implemented here: this module is the trait boundary plus an in-memory
//! double for tests.

use std::time::Duration;

use crate::error::Error;
use crate::task::TaskDescriptor;

/// Operations a scheduler needs from a connection to one surrogate.
///
/// Modeled as a native `async fn` trait (no `async-trait` macro needed on
/// a 1.75+ toolchain), the same way the teacher crate's `MetricsService`
/// trait is written.
pub trait PeerProxy: Send {
    async fn has_task(&mut self, name: &str) -> Result<bool, Error>;

    async fn install_task(&mut self, name: &str, code: &str) -> Result<(), Error>;

    /// Runs `task` in profiling mode, returning the result bytes and the
    /// surrogate-observed complexity for that run.
    async fn perform_task(&mut self, task: &TaskDescriptor, timeout: Duration) -> Result<(Vec<u8>, f64), Error>;

    async fn store_data(&mut self, bytes: &[u8]) -> Result<String, Error>;

    async fn fetch_data(&mut self, handle_id: &str) -> Result<Vec<u8>, Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

/// Builds a [`PeerProxy`] for a named, addressed peer. The scheduler takes
/// one of these rather than a concrete transport so the core never needs
/// to know how a connection is actually made.
pub trait PeerProxyFactory: Send + Sync {
    type Proxy: PeerProxy;

    fn connect(&self, peer_name: &str, address: (String, u16)) -> Result<Self::Proxy, Error>;
}

/// An in-memory stand-in surrogate used by scheduler tests: tracks which
/// task names have been "installed" and returns a caller-configured
/// `(result, observedComplexity)` pair for every `perform_task` call.
#[derive(Debug, Clone, Default)]
pub struct MockProxy {
    installed: Vec<String>,
    pub response: (Vec<u8>, f64),
    pub fail_perform: bool,
}

impl MockProxy {
    pub fn new(response: (Vec<u8>, f64)) -> Self {
        MockProxy {
            installed: Vec::new(),
            response,
            fail_perform: false,
        }
    }
}

impl PeerProxy for MockProxy {
    async fn has_task(&mut self, name: &str) -> Result<bool, Error> {
        Ok(self.installed.iter().any(|n| n == name))
    }

    async fn install_task(&mut self, name: &str, _code: &str) -> Result<(), Error> {
        self.installed.push(name.to_string());
        Ok(())
    }

    async fn perform_task(&mut self, _task: &TaskDescriptor, _timeout: Duration) -> Result<(Vec<u8>, f64), Error> {
        if self.fail_perform {
            return Err(Error::Remote("mock proxy configured to fail".into()));
        }
        Ok(self.response.clone())
    }

    async fn store_data(&mut self, bytes: &[u8]) -> Result<String, Error> {
        Ok(format!("mock-handle-{}", bytes.len()))
    }

    async fn fetch_data(&mut self, _handle_id: &str) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
