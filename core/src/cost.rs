//! Pure scoring functions: how long a candidate executor is expected to
//! take to run a task, end to end.

use crate::error::Error;
use crate::peer::Peer;
use crate::task::{Serializer, TaskDescriptor};

/// Constant per-hop latency folded into every remote transfer estimate.
pub const TRANSFER_LATENCY_SECS: f64 = 0.1;

/// `localCpuStrength / (localInFlight + 1)`.
pub fn effective_cpu_local(local_cpu: f64, in_flight: u64) -> f64 {
    local_cpu / (in_flight as f64 + 1.0)
}

/// `peer.cpuStrength / (peer.activeTasks / peer.cpuCores + 1)`, with the
/// inner division truncating like the original implementation's integer
/// division and the divisor floored at 1.
pub fn effective_cpu_remote(peer: &Peer) -> f64 {
    let per_core = peer.active_tasks / peer.cpu_cores.max(1);
    peer.cpu_strength as f64 / (per_core as f64 + 1.0)
}

/// `expectedComplexity / effectiveCpuStrength`.
pub fn predicted_execution_time(expected_complexity: f64, effective_cpu_strength: f64) -> f64 {
    expected_complexity / effective_cpu_strength
}

/// Serialized size of `task.input`, plus `task.code`'s length when present.
pub fn input_bytes(task: &TaskDescriptor, serializer: &impl Serializer) -> f64 {
    let base = serializer.size_of(&task.input) as f64;
    let code = task.code.as_ref().map(|c| c.len() as f64).unwrap_or(0.0);
    base + code
}

/// Looks up the net class (bytes/sec) of the peer owning a data handle.
/// `"localhost"` never appears here: the local host is never the owner of
/// record for a `RemoteDataHandle`, since a handle only exists once data has
/// left the originating process.
pub trait OwnerLookup {
    fn net_class_of(&self, server_name: &str) -> Option<u32>;
}

/// Predicted transfer time for running `task` on `peer`, given the
/// already-resolved `input_bytes`/`output_bytes` and the caller's local
/// network speed (used only to pick the slower of the two link speeds).
pub fn predicted_transfer_time_remote(
    task: &TaskDescriptor,
    peer: &Peer,
    local_net: f64,
    input_bytes: f64,
    output_bytes: f64,
    owners: &impl OwnerLookup,
) -> f64 {
    let base_link = local_net.min(peer.net_class as f64);
    let mut total = (input_bytes + output_bytes) / base_link + TRANSFER_LATENCY_SECS;
    for handle in task.input.data_handles() {
        if handle.server_name == peer.name {
            continue;
        }
        if let Some(owner_net) = owners.net_class_of(&handle.server_name) {
            let link = (peer.net_class as f64).min(owner_net as f64);
            total += handle.size as f64 / link;
        }
    }
    total
}

/// Predicted transfer time for running `task` locally: input/output are
/// already present, so only non-local data handles cost anything.
pub fn predicted_transfer_time_local(task: &TaskDescriptor, local_net: f64, owners: &impl OwnerLookup) -> f64 {
    let mut total = 0.0;
    for handle in task.input.data_handles() {
        if let Some(owner_net) = owners.net_class_of(&handle.server_name) {
            let link = local_net.min(owner_net as f64);
            total += handle.size as f64 / link;
        }
    }
    total
}

/// Evaluates `task.output_size`, returning 0 when the task is stored
/// remotely rather than transferred back.
pub fn output_bytes(task: &TaskDescriptor) -> Result<f64, Error> {
    task.output_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{NetClass, Peer, Announcement};
    use crate::task::{Input, SizeSpec, TaskDescriptor, Value};

    struct NoOwners;
    impl OwnerLookup for NoOwners {
        fn net_class_of(&self, _server_name: &str) -> Option<u32> {
            None
        }
    }

    fn peer(cpu: f32, cores: u32, active: u32, net: u32) -> Peer {
        Peer::new(
            "P",
            ("h".into(), 1),
            Announcement {
                cpu_strength: cpu,
                cpu_cores: cores,
                active_tasks: active,
                net_class: net,
            },
        )
    }

    #[test]
    fn effective_cpu_accounts_for_in_flight_work() {
        assert_eq!(effective_cpu_local(4.0, 0), 4.0);
        assert_eq!(effective_cpu_local(4.0, 1), 2.0);
    }

    #[test]
    fn effective_cpu_remote_divides_by_cores() {
        let p = peer(4.0, 2, 0, NetClass::WlanG.bytes_per_sec());
        assert_eq!(effective_cpu_remote(&p), 4.0);
        let p = peer(4.0, 2, 4, NetClass::WlanG.bytes_per_sec());
        // 4 active / 2 cores = 2 -> strength / 3
        assert!((effective_cpu_remote(&p) - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn remote_transfer_includes_constant_latency() {
        let task = TaskDescriptor::new(
            "t",
            Input::List(vec![Value::Json(serde_json::json!(1))]),
            SizeSpec::Constant(0.0),
        );
        let p = peer(4.0, 2, 0, NetClass::WlanG.bytes_per_sec());
        let t = predicted_transfer_time_remote(&task, &p, 500_000.0, 0.0, 0.0, &NoOwners);
        assert!((t - TRANSFER_LATENCY_SECS).abs() < 1e-9);
    }

    #[test]
    fn remote_transfer_skips_handles_already_on_the_peer() {
        use crate::task::RemoteDataHandle;
        let handle = RemoteDataHandle {
            server_name: "P".into(),
            size: 10_000_000,
            handle_id: "x".into(),
        };
        let task = TaskDescriptor::new(
            "t",
            Input::List(vec![Value::Handle(handle)]),
            SizeSpec::Constant(0.0),
        );
        let p = peer(4.0, 2, 0, NetClass::WlanG.bytes_per_sec());
        let t = predicted_transfer_time_remote(&task, &p, 500_000.0, 0.0, 0.0, &NoOwners);
        assert!((t - TRANSFER_LATENCY_SECS).abs() < 1e-9);
    }
}
