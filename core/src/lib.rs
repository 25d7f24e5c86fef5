//! Scheduling, profiling, and cost-estimation core of a cyber-foraging
//! client: decides, per invocation, whether a task should run on this
//! host or be shipped to a discovered surrogate.
//!
//! This crate owns no transport and installs no global logging
//! subscriber; both are the caller's responsibility (see the `scavenger`
//! runtime crate).

pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod formula;
pub mod peer;
pub mod profile;
pub mod proxy;
pub mod scheduler;
pub mod task;

pub use error::{Error, ScheduleFailure, Signal};
pub use peer::{Peer, PeerContext};
pub use profile::ProfileStore;
pub use proxy::{PeerProxy, PeerProxyFactory};
pub use scheduler::{InFlightCounter, Scheduler};
pub use task::{Input, RemoteDataHandle, SizeSpec, TaskDescriptor, Value};
