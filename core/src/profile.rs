//! The cost-history store: per-key histograms of observed complexities,
//! optionally bucketed by input complexity, with a simple framed on-disk
//! format.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::hash::Hash;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::warn;

/// Maximum number of measurements kept per ring/bucket.
pub const BACKLOG: usize = 10;
pub const DEFAULT_COMPLEXITY: f64 = 0.0;
pub const COMPLEXITY_VARIATION: f64 = 0.20;
pub const SIZE_VARIATION: f64 = 0.01;

const MAGIC: &[u8; 4] = b"APRF";
const FORMAT_VERSION: u8 = 1;

/// A key a [`ProfileStore`] can be indexed by: either a bare task name (the
/// global store) or an (executor, task) pair (the local store). Encoding is
/// used only for persistence; it need not be human-readable.
pub trait ProfileKey: Eq + Hash + Clone {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;
}

impl ProfileKey for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}

impl ProfileKey for (String, String) {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        out.extend_from_slice(self.0.as_bytes());
        out.extend_from_slice(self.1.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let split = u32::from_be_bytes(bytes[0..4].try_into().ok()?) as usize;
        let rest = &bytes[4..];
        if split > rest.len() {
            return None;
        }
        let a = String::from_utf8(rest[..split].to_vec()).ok()?;
        let b = String::from_utf8(rest[split..].to_vec()).ok()?;
        Some((a, b))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ProfileBucket {
    anchor: f64,
    values: VecDeque<f64>,
}

impl ProfileBucket {
    fn new(anchor: f64) -> Self {
        ProfileBucket {
            anchor,
            values: VecDeque::new(),
        }
    }

    fn register(&mut self, value: f64) {
        if self.values.len() >= BACKLOG {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }
}

/// Finds the bucket whose anchor is closest to `x` using binary search over
/// the (sorted ascending) bucket list. Ties go to the lower index. Returns
/// `None` only when `buckets` is empty.
fn closest_to(buckets: &[ProfileBucket], x: f64) -> Option<usize> {
    if buckets.is_empty() {
        return None;
    }
    match buckets.binary_search_by(|b| b.anchor.partial_cmp(&x).unwrap()) {
        Ok(exact) => Some(exact),
        Err(insert_at) => {
            if insert_at == 0 {
                Some(0)
            } else if insert_at == buckets.len() {
                Some(buckets.len() - 1)
            } else {
                let y = insert_at - 1;
                let z = insert_at;
                let diff_to_y = x - buckets[y].anchor;
                let diff_to_z = buckets[z].anchor - x;
                if diff_to_y <= diff_to_z {
                    Some(y)
                } else {
                    Some(z)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    OneD(VecDeque<f64>),
    TwoD(Vec<ProfileBucket>),
}

/// Histogram of observed complexities for a single key. Locked into either
/// 1-D or 2-D mode on first registration; a caller that mixes modes for the
/// same key is a programming error, caught with a `debug_assert!` rather
/// than a runtime `Result`, since it can only arise from inconsistent
/// caller code, not untrusted input (resolves the Open Question in
/// SPEC_FULL.md §9).
#[derive(Debug, Clone, PartialEq)]
struct ProfileItem {
    mode: Mode,
}

impl ProfileItem {
    fn new_one_d() -> Self {
        ProfileItem {
            mode: Mode::OneD(VecDeque::new()),
        }
    }

    fn new_two_d() -> Self {
        ProfileItem {
            mode: Mode::TwoD(Vec::new()),
        }
    }

    fn register(&mut self, value: f64, input_complexity: Option<f64>) {
        match (&mut self.mode, input_complexity) {
            (Mode::OneD(ring), None) => {
                if ring.len() >= BACKLOG {
                    ring.pop_front();
                }
                ring.push_back(value);
            }
            (Mode::TwoD(buckets), Some(input_complexity)) => {
                match closest_to(buckets, input_complexity) {
                    None => buckets.push(ProfileBucket::new(input_complexity).tap(value)),
                    Some(idx) => {
                        let candidate = &buckets[idx];
                        let candidate_mean = candidate.mean().unwrap_or(value);
                        let complexity_variation = ((candidate_mean - value) / candidate_mean).abs();
                        let size_variation =
                            ((candidate.anchor - input_complexity) / candidate.anchor).abs();
                        if complexity_variation > COMPLEXITY_VARIATION && size_variation > SIZE_VARIATION {
                            let insert_at = if input_complexity < candidate.anchor { idx } else { idx + 1 };
                            buckets.insert(insert_at, ProfileBucket::new(input_complexity).tap(value));
                        } else {
                            buckets[idx].register(value);
                        }
                    }
                }
            }
            (mode, input_complexity) => {
                debug_assert!(
                    false,
                    "ProfileItem used in {} mode after being created in the other mode (input_complexity={:?})",
                    if matches!(mode, Mode::OneD(_)) { "1-D" } else { "2-D" },
                    input_complexity
                );
            }
        }
    }

    fn get_complexity(&self, input_complexity: Option<f64>) -> f64 {
        match (&self.mode, input_complexity) {
            (Mode::OneD(ring), None) => {
                if ring.is_empty() {
                    DEFAULT_COMPLEXITY
                } else {
                    ring.iter().sum::<f64>() / ring.len() as f64
                }
            }
            (Mode::TwoD(buckets), Some(input_complexity)) => closest_to(buckets, input_complexity)
                .and_then(|idx| buckets[idx].mean())
                .unwrap_or(DEFAULT_COMPLEXITY),
            (mode, input_complexity) => {
                debug_assert!(
                    false,
                    "ProfileItem queried in {} mode after being created in the other mode (input_complexity={:?})",
                    if matches!(mode, Mode::OneD(_)) { "1-D" } else { "2-D" },
                    input_complexity
                );
                DEFAULT_COMPLEXITY
            }
        }
    }

}

impl ProfileBucket {
    fn tap(mut self, value: f64) -> Self {
        self.register(value);
        self
    }
}

/// Persistent, thread-safe cost-history store keyed by `K`.
pub struct ProfileStore<K: ProfileKey> {
    data: Mutex<HashMap<K, ProfileItem>>,
}

impl<K: ProfileKey> Default for ProfileStore<K> {
    fn default() -> Self {
        ProfileStore {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: ProfileKey> ProfileStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from `path`. Any parse failure is swallowed and an
    /// empty store is returned, per the "file is either well-formed or
    /// absent" invariant — a corrupt file never blocks startup.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(store) => store,
            Err(err) => {
                if path.exists() {
                    warn!(?path, error = %err, "profile store file unreadable, starting empty");
                }
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
        }
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported version"));
        }

        let mut count_buf = [0u8; 4];
        reader.read_exact(&mut count_buf)?;
        let entry_count = u32::from_be_bytes(count_buf);

        let mut data = HashMap::new();
        for _ in 0..entry_count {
            let (key, item) = read_entry(&mut reader)?;
            data.insert(key, item);
        }
        Ok(ProfileStore {
            data: Mutex::new(data),
        })
    }

    /// Appends a measurement. `input_complexity.is_some()` selects 2-D
    /// (bucketed) mode for a brand-new key.
    pub fn register(&self, key: K, value: f64, input_complexity: Option<f64>) {
        let mut data = self.data.lock().unwrap();
        let item = data.entry(key).or_insert_with(|| {
            if input_complexity.is_some() {
                ProfileItem::new_two_d()
            } else {
                ProfileItem::new_one_d()
            }
        });
        item.register(value, input_complexity);
    }

    /// Returns the expected complexity for `key`, or `default` if the key
    /// is unknown.
    pub fn get_complexity(&self, key: &K, default: f64, input_complexity: Option<f64>) -> f64 {
        let data = self.data.lock().unwrap();
        match data.get(key) {
            Some(item) => item.get_complexity(input_complexity),
            None => default,
        }
    }

    /// Atomically persists the store to `path` (write to a temp file, then
    /// rename, so a crash mid-write never corrupts the previous snapshot).
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC)?;
            writer.write_all(&[FORMAT_VERSION])?;

            let data = self.data.lock().unwrap();
            writer.write_all(&(data.len() as u32).to_be_bytes())?;
            for (key, item) in data.iter() {
                write_entry(&mut writer, key, item)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn write_entry<W: Write, K: ProfileKey>(writer: &mut W, key: &K, item: &ProfileItem) -> io::Result<()> {
    let key_bytes = key.encode();
    writer.write_all(&(key_bytes.len() as u32).to_be_bytes())?;
    writer.write_all(&key_bytes)?;

    match &item.mode {
        Mode::OneD(ring) => {
            writer.write_all(&[0u8])?;
            writer.write_all(&(ring.len() as u32).to_be_bytes())?;
            for v in ring {
                writer.write_all(&v.to_be_bytes())?;
            }
        }
        Mode::TwoD(buckets) => {
            writer.write_all(&[1u8])?;
            writer.write_all(&(buckets.len() as u32).to_be_bytes())?;
            for bucket in buckets {
                writer.write_all(&bucket.anchor.to_be_bytes())?;
                writer.write_all(&(bucket.values.len() as u32).to_be_bytes())?;
                for v in &bucket.values {
                    writer.write_all(&v.to_be_bytes())?;
                }
            }
        }
    }
    Ok(())
}

fn read_entry<R: Read, K: ProfileKey>(reader: &mut R) -> io::Result<(K, ProfileItem)> {
    let key_len = read_u32(reader)? as usize;
    let mut key_bytes = vec![0u8; key_len];
    reader.read_exact(&mut key_bytes)?;
    let key = K::decode(&key_bytes).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad key"))?;

    let mut mode_byte = [0u8; 1];
    reader.read_exact(&mut mode_byte)?;
    let item = match mode_byte[0] {
        0 => {
            let count = read_u32(reader)?;
            let mut ring = VecDeque::new();
            for _ in 0..count {
                ring.push_back(read_f64(reader)?);
            }
            ProfileItem { mode: Mode::OneD(ring) }
        }
        1 => {
            let bucket_count = read_u32(reader)?;
            let mut buckets = Vec::with_capacity(bucket_count as usize);
            for _ in 0..bucket_count {
                let anchor = read_f64(reader)?;
                let value_count = read_u32(reader)?;
                let mut values = VecDeque::new();
                for _ in 0..value_count {
                    values.push_back(read_f64(reader)?);
                }
                buckets.push(ProfileBucket { anchor, values });
            }
            ProfileItem { mode: Mode::TwoD(buckets) }
        }
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "bad mode byte")),
    };
    Ok((key, item))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_d_ring_evicts_oldest_beyond_backlog() {
        let store: ProfileStore<String> = ProfileStore::new();
        for i in 1..=(BACKLOG + 1) {
            store.register("t".to_string(), i as f64, None);
        }
        // Samples 2..=11 remain; mean = (2+...+11)/10 = 6.5
        let got = store.get_complexity(&"t".to_string(), DEFAULT_COMPLEXITY, None);
        assert!((got - 6.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_key_returns_default() {
        let store: ProfileStore<String> = ProfileStore::new();
        assert_eq!(store.get_complexity(&"missing".to_string(), 42.0, None), 42.0);
    }

    #[test]
    fn bucket_split_on_both_variations_exceeded() {
        let store: ProfileStore<String> = ProfileStore::new();
        for _ in 0..BACKLOG {
            store.register("t".to_string(), 1.0, Some(10.0));
        }
        store.register("t".to_string(), 10.0, Some(10_000.0));
        let low = store.get_complexity(&"t".to_string(), DEFAULT_COMPLEXITY, Some(10.0));
        let high = store.get_complexity(&"t".to_string(), DEFAULT_COMPLEXITY, Some(10_000.0));
        assert!((low - 1.0).abs() < 1e-9);
        assert!((high - 10.0).abs() < 1e-9);
    }

    #[test]
    fn admission_exactly_at_thresholds_stays_in_bucket() {
        let store: ProfileStore<String> = ProfileStore::new();
        store.register("t".to_string(), 100.0, Some(100.0));
        // complexity_variation = |100 - 120| / 100 = 0.20 (not > 0.20)
        // size_variation = |100 - 101| / 100 = 0.01 (not > 0.01)
        store.register("t".to_string(), 120.0, Some(101.0));
        let got = store.get_complexity(&"t".to_string(), DEFAULT_COMPLEXITY, Some(100.5));
        // Both measurements land in the single surviving bucket.
        assert!((got - 110.0).abs() < 1e-9);
    }

    #[test]
    fn save_and_load_round_trip_preserves_means() {
        let dir = std::env::temp_dir().join(format!("aprofile-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile.dat");

        let store: ProfileStore<String> = ProfileStore::new();
        store.register("a".to_string(), 1.0, None);
        store.register("a".to_string(), 3.0, None);
        store.register("b".to_string(), 5.0, Some(7.0));
        store.save(&path).unwrap();

        let reloaded: ProfileStore<String> = ProfileStore::load(&path);
        assert!((reloaded.get_complexity(&"a".to_string(), 0.0, None) - 2.0).abs() < 1e-9);
        assert!((reloaded.get_complexity(&"b".to_string(), 0.0, Some(7.0)) - 5.0).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_of_missing_file_starts_empty() {
        let store: ProfileStore<String> = ProfileStore::load("/nonexistent/path/aprofile.dat");
        assert_eq!(store.get_complexity(&"x".to_string(), 0.0, None), 0.0);
    }

    #[test]
    fn local_key_pair_round_trips() {
        let key: (String, String) = ("peer-a".into(), "task.name".into());
        let encoded = key.encode();
        assert_eq!(<(String, String) as ProfileKey>::decode(&encoded), Some(key));
    }
}
