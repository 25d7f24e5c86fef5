use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// How long a peer may go unseen before it is considered gone.
pub const STALENESS: Duration = Duration::from_secs(5);

/// Opportunistic-compaction threshold: once the directory holds more than
/// this many entries, an `upsert` sweeps stale ones instead of waiting for a
/// read path to notice them.
pub const CLEANUP_AT: usize = 100;

/// Nominal link bandwidth classes, in bytes/sec, recognized in discovery
/// payloads and configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetClass {
    Bt1,
    Bt2,
    WlanB,
    Lan10,
    WlanG,
    Lan100,
    Lan1k,
}

impl NetClass {
    pub fn bytes_per_sec(self) -> u32 {
        match self {
            NetClass::Bt1 => 34_000,
            NetClass::Bt2 => 100_000,
            NetClass::WlanB => 500_000,
            NetClass::Lan10 => 937_500,
            NetClass::WlanG => 2_500_000,
            NetClass::Lan100 => 9_375_000,
            NetClass::Lan1k => 93_750_000,
        }
    }

    pub fn from_name(name: &str) -> Option<u32> {
        let class = match name {
            "BT-1" => NetClass::Bt1,
            "BT-2" => NetClass::Bt2,
            "WLAN-b" => NetClass::WlanB,
            "LAN10" => NetClass::Lan10,
            "WLAN-g" => NetClass::WlanG,
            "LAN100" => NetClass::Lan100,
            "LAN1K" => NetClass::Lan1k,
            _ => return None,
        };
        Some(class.bytes_per_sec())
    }
}

/// A discovered surrogate.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub name: String,
    pub address: (String, u16),
    pub cpu_strength: f32,
    pub cpu_cores: u32,
    pub active_tasks: u32,
    pub net_class: u32,
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(name: impl Into<String>, address: (String, u16), announcement: Announcement) -> Self {
        Peer {
            name: name.into(),
            address,
            cpu_strength: announcement.cpu_strength,
            cpu_cores: announcement.cpu_cores.max(1),
            active_tasks: announcement.active_tasks,
            net_class: announcement.net_class,
            last_seen: Instant::now(),
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > STALENESS
    }
}

/// Decoded payload of a discovery announcement:
/// `(float32 cpuStrength, uint32 cpuCores, uint32 activeTasks, uint32 netClass)`
/// in network (big-endian) byte order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Announcement {
    pub cpu_strength: f32,
    pub cpu_cores: u32,
    pub active_tasks: u32,
    pub net_class: u32,
}

impl Announcement {
    /// Decodes a fixed 16-byte big-endian record. Returns `None` if `bytes`
    /// is not exactly 16 bytes long.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let cpu_strength = f32::from_be_bytes(bytes[0..4].try_into().ok()?);
        let cpu_cores = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
        let active_tasks = u32::from_be_bytes(bytes[8..12].try_into().ok()?);
        let net_class = u32::from_be_bytes(bytes[12..16].try_into().ok()?);
        Some(Announcement {
            cpu_strength,
            cpu_cores,
            active_tasks,
            net_class,
        })
    }
}

/// In-memory directory of known surrogates. All operations are serialized
/// under a single mutex; the lock is held only for the duration of the
/// (synchronous, allocation-bound) operation.
#[derive(Debug, Default)]
pub struct PeerContext {
    peers: Mutex<HashMap<String, Peer>>,
}

impl PeerContext {
    pub fn new() -> Self {
        PeerContext {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts or overwrites a peer by name (latest record wins). Sweeps
    /// stale entries if the directory has grown past `CLEANUP_AT`.
    pub fn upsert(&self, peer: Peer) {
        let mut peers = self.peers.lock().unwrap();
        peers.insert(peer.name.clone(), peer);
        if peers.len() > CLEANUP_AT {
            let now = Instant::now();
            let before = peers.len();
            peers.retain(|_, p| !p.is_stale(now));
            debug!(evicted = before - peers.len(), "opportunistic stale-peer sweep");
        }
    }

    pub fn get(&self, name: &str) -> Option<Peer> {
        self.peers.lock().unwrap().get(name).cloned()
    }

    /// Returns deep copies of all non-stale peers, evicting stale ones in
    /// the process.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers = self.peers.lock().unwrap();
        let now = Instant::now();
        let stale_names: Vec<String> = peers
            .iter()
            .filter(|(_, p)| p.is_stale(now))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale_names {
            peers.remove(name);
        }
        peers.values().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        let peers = self.peers.lock().unwrap();
        match peers.get(name) {
            Some(p) => !p.is_stale(Instant::now()),
            None => false,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<(String, u16)> {
        self.peers.lock().unwrap().get(name).map(|p| p.address.clone())
    }

    pub fn inc_activity(&self, name: &str) {
        if let Some(peer) = self.peers.lock().unwrap().get_mut(name) {
            peer.active_tasks += 1;
        }
    }

    pub fn dec_activity(&self, name: &str) {
        if let Some(peer) = self.peers.lock().unwrap().get_mut(name) {
            peer.active_tasks = peer.active_tasks.saturating_sub(1);
        }
    }
}
