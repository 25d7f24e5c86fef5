//! The decision core: builds a candidate set, scores it, and either
//! dispatches to a surrogate or signals the caller to fall back to local
//! execution.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cost::{
    effective_cpu_local, effective_cpu_remote, input_bytes, predicted_execution_time,
    predicted_transfer_time_local, predicted_transfer_time_remote, OwnerLookup,
};
use crate::error::{Error, ScheduleFailure, Signal};
use crate::peer::{Peer, PeerContext};
use crate::profile::ProfileStore;
use crate::proxy::{PeerProxy, PeerProxyFactory};
use crate::task::{JsonSerializer, TaskDescriptor};

/// Default per-task RPC timeout; callers can override per task via
/// [`Scheduler::schedule_with_timeout`].
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared local in-flight task counter, read by the cost model and bumped
/// whenever the scheduler (or the dispatcher, on local fallback) commits to
/// running something on this host.
#[derive(Debug, Default)]
pub struct InFlightCounter(AtomicI64);

impl InFlightCounter {
    pub fn new() -> Self {
        InFlightCounter(AtomicI64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct Candidate {
    time: f64,
    peer: Option<Peer>,
}

struct SnapshotOwners<'a>(&'a [Peer]);

impl<'a> OwnerLookup for SnapshotOwners<'a> {
    fn net_class_of(&self, server_name: &str) -> Option<u32> {
        self.0.iter().find(|p| p.name == server_name).map(|p| p.net_class)
    }
}

/// Decrements a peer's activity count on drop, regardless of whether the
/// enclosing future ran to completion, panicked, or was cancelled by being
/// dropped mid-poll. A deliberate strengthening over the bare "decrement
/// after the await" baseline (see DESIGN.md).
struct ActivityGuard<'a> {
    context: &'a PeerContext,
    peer_name: String,
    armed: bool,
}

impl<'a> ActivityGuard<'a> {
    fn new(context: &'a PeerContext, peer_name: String) -> Self {
        context.inc_activity(&peer_name);
        ActivityGuard {
            context,
            peer_name,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
        self.context.dec_activity(&self.peer_name);
    }
}

impl<'a> Drop for ActivityGuard<'a> {
    fn drop(&mut self) {
        if self.armed {
            self.context.dec_activity(&self.peer_name);
        }
    }
}

/// The adaptive-profiling scheduler. Owns no network connections itself;
/// `F` supplies them on demand for whichever peer wins candidate scoring.
pub struct Scheduler<F: PeerProxyFactory> {
    context: Arc<PeerContext>,
    global: Arc<ProfileStore<String>>,
    local: Arc<ProfileStore<(String, String)>>,
    in_flight: Arc<InFlightCounter>,
    lock: AsyncMutex<()>,
    proxy_factory: F,
    serializer: JsonSerializer,
}

impl<F: PeerProxyFactory> Scheduler<F> {
    pub fn new(
        context: Arc<PeerContext>,
        global: Arc<ProfileStore<String>>,
        local: Arc<ProfileStore<(String, String)>>,
        in_flight: Arc<InFlightCounter>,
        proxy_factory: F,
    ) -> Self {
        Scheduler {
            context,
            global,
            local,
            in_flight,
            lock: AsyncMutex::new(()),
            proxy_factory,
            serializer: JsonSerializer,
        }
    }

    /// Schedules `task` with the default RPC timeout (see
    /// [`DEFAULT_RPC_TIMEOUT`]).
    pub async fn schedule(
        &self,
        task: &mut TaskDescriptor,
        local_cpu: f64,
        local_net: f64,
        prefer_remote: bool,
    ) -> Result<Vec<u8>, ScheduleFailure> {
        self.schedule_with_timeout(task, local_cpu, local_net, prefer_remote, DEFAULT_RPC_TIMEOUT)
            .await
    }

    pub async fn schedule_with_timeout(
        &self,
        task: &mut TaskDescriptor,
        local_cpu: f64,
        local_net: f64,
        prefer_remote: bool,
        rpc_timeout: Duration,
    ) -> Result<Vec<u8>, ScheduleFailure> {
        task.resolve_complexity().map_err(ScheduleFailure::from)?;

        let guard = self.lock.lock().await;
        let peers = self.context.snapshot();
        if peers.is_empty() {
            self.in_flight.inc();
            drop(guard);
            return Err(ScheduleFailure::from(Signal::NoSurrogates));
        }

        let owners = SnapshotOwners(&peers);
        let in_bytes = input_bytes(task, &self.serializer);
        let out_bytes = task.output_bytes().map_err(ScheduleFailure::from)?;

        let mut candidates = Vec::with_capacity(peers.len() + 1);
        if !prefer_remote {
            let expected_global = self.global.get_complexity(&task.name, 0.0, task.complexity);
            let expected_local =
                self.local
                    .get_complexity(&("localhost".to_string(), task.name.clone()), expected_global, task.complexity);
            let exec = predicted_execution_time(
                expected_local,
                effective_cpu_local(local_cpu, self.in_flight.value().max(0) as u64),
            );
            let transfer = predicted_transfer_time_local(task, local_net, &owners);
            candidates.push(Candidate {
                time: exec + transfer,
                peer: None,
            });
        }

        for peer in &peers {
            let expected_global = self.global.get_complexity(&task.name, 0.0, task.complexity);
            let expected_remote = self.local.get_complexity(
                &(peer.name.clone(), task.name.clone()),
                expected_global,
                task.complexity,
            );
            let exec = predicted_execution_time(expected_remote, effective_cpu_remote(peer));
            let transfer = predicted_transfer_time_remote(task, peer, local_net, in_bytes, out_bytes, &owners);
            candidates.push(Candidate {
                time: exec + transfer,
                peer: Some(peer.clone()),
            });
        }

        candidates.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());
        let winner = candidates.into_iter().next().expect("at least the local candidate or one peer");

        let Some(winner_peer) = winner.peer else {
            self.in_flight.inc();
            drop(guard);
            debug!(task = %task.name, "local host won scoring");
            return Err(ScheduleFailure::from(Signal::DoLocal));
        };

        let activity = ActivityGuard::new(&self.context, winner_peer.name.clone());
        drop(guard);

        let result = self
            .run_remote(task, &winner_peer, rpc_timeout)
            .await;

        let guard = self.lock.lock().await;
        let outcome = match result {
            Ok((bytes, observed)) => {
                self.global.register(task.name.clone(), observed, task.complexity);
                self.local
                    .register((winner_peer.name.clone(), task.name.clone()), observed, task.complexity);
                info!(task = %task.name, peer = %winner_peer.name, "scavenge completed remotely");
                Ok(bytes)
            }
            Err(err) => {
                warn!(task = %task.name, peer = %winner_peer.name, error = %err, "remote scavenge failed");
                Err(ScheduleFailure::from(err))
            }
        };
        activity.disarm();
        drop(guard);

        outcome
    }

    async fn run_remote(
        &self,
        task: &TaskDescriptor,
        peer: &Peer,
        rpc_timeout: Duration,
    ) -> Result<(Vec<u8>, f64), Error> {
        let Some(address) = self.context.resolve(&peer.name) else {
            return Err(Error::PeerGone(peer.name.clone()));
        };

        let attempt = async {
            let mut proxy = self.proxy_factory.connect(&peer.name, address)?;
            if !proxy.has_task(&task.name).await? {
                if let Some(code) = &task.code {
                    proxy.install_task(&task.name, code).await?;
                }
            }
            let outcome = proxy.perform_task(task, rpc_timeout).await;
            let _ = proxy.close().await;
            outcome
        };

        match tokio::time::timeout(rpc_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(Error::Remote(format!("rpc to '{}' timed out after {:?}", peer.name, rpc_timeout))),
        }
    }
}
