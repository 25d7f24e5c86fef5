//! Local execution path: used when the scheduler signals `DoLocal` or
//! `NoSurrogates` and the caller has local code to run.

use std::future::Future;
use std::time::Instant;

use tracing::debug;

use crate::error::Error;
use crate::profile::ProfileStore;
use crate::scheduler::InFlightCounter;
use crate::task::{Input, RemoteDataHandle, TaskDescriptor, Value};

/// Fetches the bytes behind a [`RemoteDataHandle`] from its owning peer.
/// Implemented outside this crate (the core only defines the shape of the
/// call); a no-op resolver is fine for tasks with no handles in their
/// input.
pub trait HandleResolver {
    async fn fetch(&self, handle: &RemoteDataHandle) -> Result<Vec<u8>, Error>;
}

/// Resolves every [`RemoteDataHandle`] in `input` into the JSON value
/// produced by decoding the fetched bytes as UTF-8 text (the simplest
/// resolution contract a [`HandleResolver`] can satisfy; callers that need
/// binary payloads pass them through `code`/custom encodings instead).
pub async fn resolve_handles<R: HandleResolver>(input: &Input, resolver: &R) -> Result<Input, Error> {
    match input {
        Input::List(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for v in items {
                resolved.push(resolve_value(resolver, v).await?);
            }
            Ok(Input::List(resolved))
        }
        Input::Map(map) => {
            let mut resolved = std::collections::BTreeMap::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(resolver, v).await?);
            }
            Ok(Input::Map(resolved))
        }
        Input::Single(v) => Ok(Input::Single(resolve_value(resolver, v).await?)),
    }
}

async fn resolve_value<R: HandleResolver>(resolver: &R, value: &Value) -> Result<Value, Error> {
    match value {
        Value::Handle(handle) => {
            let bytes = resolver.fetch(handle).await?;
            let text = String::from_utf8(bytes).map_err(|e| Error::Remote(e.to_string()))?;
            Ok(Value::Json(serde_json::Value::String(text)))
        }
        Value::Json(v) => Ok(Value::Json(v.clone())),
    }
}

/// Runs a task's code locally, timing the call and feeding the observed
/// complexity back into both profile stores.
pub struct LocalExecutor {
    pub global: std::sync::Arc<ProfileStore<String>>,
    pub local: std::sync::Arc<ProfileStore<(String, String)>>,
    pub in_flight: std::sync::Arc<InFlightCounter>,
}

impl LocalExecutor {
    pub fn new(
        global: std::sync::Arc<ProfileStore<String>>,
        local: std::sync::Arc<ProfileStore<(String, String)>>,
        in_flight: std::sync::Arc<InFlightCounter>,
    ) -> Self {
        LocalExecutor { global, local, in_flight }
    }

    /// Resolves every `RemoteDataHandle` in `task.input` via `resolver`,
    /// then invokes `call` with the resolved input — shaped to mapping,
    /// list/tuple, or single-value form exactly as `task.input` was, so
    /// `call` can destructure it into named parameters, positional
    /// arguments, or a single argument respectively. Computes
    /// `activityLevel = (a1 + a2) / 2` and
    /// `observedComplexity = (elapsed * localCpuStrength) / activityLevel`
    /// around the call. `in_flight` is always decremented on exit, success
    /// or failure — `call` itself is responsible for incrementing it (the
    /// scheduler does this before signaling `DoLocal`/`NoSurrogates`).
    pub async fn run<R, C, Fut>(
        &self,
        task: &TaskDescriptor,
        local_cpu_strength: f64,
        resolver: &R,
        call: C,
    ) -> Result<Vec<u8>, Error>
    where
        R: HandleResolver,
        C: FnOnce(Input) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, Error>>,
    {
        let resolved_input = resolve_handles(&task.input, resolver).await?;

        let a1 = self.in_flight.value().max(0) as f64;
        let start = Instant::now();
        let result = call(resolved_input).await;
        let elapsed = start.elapsed().as_secs_f64();
        self.in_flight.dec();
        let a2 = self.in_flight.value().max(0) as f64 + 1.0;

        let activity_level = (a1 + a2) / 2.0;
        let observed_complexity = if activity_level > 0.0 {
            (elapsed * local_cpu_strength) / activity_level
        } else {
            0.0
        };

        self.global.register(task.name.clone(), observed_complexity, task.complexity);
        self.local
            .register(("localhost".to_string(), task.name.clone()), observed_complexity, task.complexity);
        debug!(task = %task.name, elapsed, observed_complexity, "local execution profiled");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SizeSpec, Value};

    struct EchoResolver;
    impl HandleResolver for EchoResolver {
        async fn fetch(&self, handle: &RemoteDataHandle) -> Result<Vec<u8>, Error> {
            Ok(handle.handle_id.clone().into_bytes())
        }
    }

    #[tokio::test]
    async fn resolve_handles_replaces_handles_with_fetched_text() {
        let handle = RemoteDataHandle {
            server_name: "P".into(),
            size: 3,
            handle_id: "abc".into(),
        };
        let input = Input::List(vec![Value::Handle(handle), Value::Json(serde_json::json!(1))]);
        let resolved = resolve_handles(&input, &EchoResolver).await.unwrap();
        match resolved {
            Input::List(items) => {
                assert_eq!(items[0], Value::Json(serde_json::Value::String("abc".to_string())));
                assert_eq!(items[1], Value::Json(serde_json::json!(1)));
            }
            _ => panic!("expected list"),
        }
    }

    #[tokio::test]
    async fn run_registers_observed_complexity_and_decrements_in_flight() {
        let global = std::sync::Arc::new(ProfileStore::new());
        let local = std::sync::Arc::new(ProfileStore::new());
        let in_flight = std::sync::Arc::new(InFlightCounter::new());
        in_flight.inc();

        let executor = LocalExecutor::new(global.clone(), local.clone(), in_flight.clone());
        let task = TaskDescriptor::new("t", Input::Single(Value::Json(serde_json::json!(1))), SizeSpec::Constant(0.0));

        executor
            .run(&task, 4.0, &EchoResolver, |input| async move {
                match input {
                    Input::Single(Value::Json(v)) => Ok(v.to_string().into_bytes()),
                    _ => Ok(b"done".to_vec()),
                }
            })
            .await
            .unwrap();

        assert_eq!(in_flight.value(), 0);
        assert!(global.get_complexity(&"t".to_string(), -1.0, None) >= 0.0);
    }
}
