//! The dependency-injected assembly root: the one object an application
//! constructs once and keeps for the process lifetime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scavenger_core::dispatcher::{HandleResolver, LocalExecutor};
use scavenger_core::error::{ScheduleFailure, Signal};
use scavenger_core::peer::PeerContext;
use scavenger_core::profile::ProfileStore;
use scavenger_core::proxy::PeerProxyFactory;
use scavenger_core::scheduler::{InFlightCounter, Scheduler};
use scavenger_core::task::{Input, TaskDescriptor};

use crate::config::LocalConfig;
use crate::error::RuntimeError;

const GLOBAL_PROFILE_FILE: &str = "agprofile.dat";
const LOCAL_PROFILE_FILE: &str = "alprofile.dat";

/// Owns the profile stores, peer directory, local CPU/network parameters,
/// and in-flight counter; exposes `scavenge` as the single public entry
/// point that collapses every internal `Signal`/`Error` into
/// [`RuntimeError`].
pub struct ScavengerRuntime<F: PeerProxyFactory, R: HandleResolver> {
    state_dir: PathBuf,
    config: LocalConfig,
    context: Arc<PeerContext>,
    global: Arc<ProfileStore<String>>,
    local: Arc<ProfileStore<(String, String)>>,
    in_flight: Arc<InFlightCounter>,
    scheduler: Scheduler<F>,
    executor: LocalExecutor,
    resolver: R,
}

impl<F: PeerProxyFactory, R: HandleResolver> ScavengerRuntime<F, R> {
    pub fn new(
        config_path: impl AsRef<Path>,
        state_dir: impl AsRef<Path>,
        proxy_factory: F,
        resolver: R,
    ) -> Result<Self, RuntimeError> {
        let config = LocalConfig::load(config_path)?;
        let state_dir = state_dir.as_ref().to_path_buf();

        let global = Arc::new(ProfileStore::load(state_dir.join(GLOBAL_PROFILE_FILE)));
        let local = Arc::new(ProfileStore::load(state_dir.join(LOCAL_PROFILE_FILE)));
        let context = Arc::new(PeerContext::new());
        let in_flight = Arc::new(InFlightCounter::new());

        let scheduler = Scheduler::new(context.clone(), global.clone(), local.clone(), in_flight.clone(), proxy_factory);
        let executor = LocalExecutor::new(global.clone(), local.clone(), in_flight.clone());

        Ok(ScavengerRuntime {
            state_dir,
            config,
            context,
            global,
            local,
            in_flight,
            scheduler,
            executor,
            resolver,
        })
    }

    pub fn context(&self) -> &PeerContext {
        &self.context
    }

    pub fn peers(&self) -> Vec<scavenger_core::peer::Peer> {
        self.context.snapshot()
    }

    pub fn config(&self) -> LocalConfig {
        self.config
    }

    /// Schedules `task`, falling back to `local_code` on `NoSurrogates`/
    /// `DoLocal` if it was supplied, or raising
    /// [`RuntimeError::NoSurrogatesAvailable`] otherwise. `local_code`
    /// receives the task's input with every `RemoteDataHandle` resolved and
    /// shaped to its original mapping/list/single form.
    pub async fn scavenge<C, Fut>(&self, task: &mut TaskDescriptor, local_code: Option<C>) -> Result<Vec<u8>, RuntimeError>
    where
        C: FnOnce(Input) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, scavenger_core::Error>>,
    {
        let prefer_remote = local_code.is_none();
        match self
            .scheduler
            .schedule(task, self.config.cpu_strength, self.config.network_speed, prefer_remote)
            .await
        {
            Ok(bytes) => Ok(bytes),
            Err(ScheduleFailure::Signal(Signal::NoSurrogates)) | Err(ScheduleFailure::Signal(Signal::DoLocal)) => {
                match local_code {
                    Some(call) => Ok(self
                        .executor
                        .run(task, self.config.cpu_strength, &self.resolver, call)
                        .await?),
                    None => Err(RuntimeError::NoSurrogatesAvailable),
                }
            }
            Err(ScheduleFailure::Err(e)) => Err(RuntimeError::from(e)),
        }
    }

    /// Flushes both profile stores to their files and consumes `self`.
    pub fn shutdown(self) -> Result<(), RuntimeError> {
        self.global.save(self.state_dir.join(GLOBAL_PROFILE_FILE))?;
        self.local.save(self.state_dir.join(LOCAL_PROFILE_FILE))?;
        Ok(())
    }
}
