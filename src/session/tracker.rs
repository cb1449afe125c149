use crate::content::{Category, ImageSignature};
use crate::error::Result;
use crate::session::NamingManifest;
use crate::storage::SavePath;
use chrono::{DateTime, Duration, Utc};
use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Stable 16-hex-digit key for a JSON seed value. Serialization is compact
/// with object keys in sorted order, so logically equal seeds always map to
/// the same key.
pub fn fingerprint_of(seed: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(seed).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Dedup identity of an on-disk file: absolute path (case-folded where the
/// filesystem is), mtime in nanoseconds, and size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSignature {
    path: String,
    mtime_ns: i64,
    size: u64,
}

impl FileSignature {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        let mtime_ns = mtime.unix_seconds() * 1_000_000_000 + mtime.nanoseconds() as i64;

        let path = path.to_string_lossy().to_string();
        #[cfg(windows)]
        let path = path.to_lowercase();

        Ok(Self {
            path,
            mtime_ns,
            size: metadata.len(),
        })
    }
}

/// Per-run accumulation state: the archive slot, member counters, and the
/// dedup sets that stop identical content from being written twice.
#[derive(Debug)]
pub struct SessionState {
    run_key: String,
    last_activity: DateTime<Utc>,
    save_path: Option<SavePath>,
    total_written: u64,
    notified: bool,
    counters: HashMap<Category, u64>,
    blob_counter: u64,
    image_signatures: HashSet<ImageSignature>,
    file_signatures: HashSet<FileSignature>,
    naming: NamingManifest,
    manifest_loaded: bool,
}

impl SessionState {
    fn new(run_key: String, now: DateTime<Utc>) -> Self {
        Self {
            run_key,
            last_activity: now,
            save_path: None,
            total_written: 0,
            notified: false,
            counters: HashMap::new(),
            blob_counter: 0,
            image_signatures: HashSet::new(),
            file_signatures: HashSet::new(),
            naming: NamingManifest::new(),
            manifest_loaded: false,
        }
    }

    /// Parse and adopt the caller's naming input, once per session. Later
    /// calls within the same session keep the queues already in flight.
    pub fn load_manifest_once(&mut self, raw: &serde_json::Value) {
        if self.manifest_loaded {
            return;
        }
        self.naming = NamingManifest::parse(raw);
        self.manifest_loaded = true;
    }

    pub fn naming_mut(&mut self) -> &mut NamingManifest {
        &mut self.naming
    }

    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn record_written(&mut self, count: u64) {
        self.total_written += count;
    }

    /// The archive slot for this run, allocated by the first caller.
    pub fn save_path(&self) -> Option<&SavePath> {
        self.save_path.as_ref()
    }

    pub fn set_save_path(&mut self, save_path: SavePath) {
        self.save_path = Some(save_path);
    }

    /// Current synthesized-name index for `category`; starts at 0 per run.
    pub fn peek_index(&self, category: Category) -> u64 {
        self.counters.get(&category).copied().unwrap_or(0)
    }

    /// Advance the category counter after a successful write.
    pub fn bump_index(&mut self, category: Category) {
        *self.counters.entry(category).or_insert(0) += 1;
    }

    pub fn peek_blob_index(&self) -> u64 {
        self.blob_counter
    }

    pub fn bump_blob_index(&mut self) {
        self.blob_counter += 1;
    }

    /// Whether an identical frame was already written this run.
    pub fn seen_image(&self, signature: &ImageSignature) -> bool {
        self.image_signatures.contains(signature)
    }

    /// True if the frame was not seen before in this run. Records it.
    pub fn admit_image(&mut self, signature: ImageSignature) -> bool {
        self.image_signatures.insert(signature)
    }

    /// True if the file was not seen before in this run. Records it.
    pub fn admit_file(&mut self, signature: FileSignature) -> bool {
        self.file_signatures.insert(signature)
    }

    /// First successful write of a run triggers a completion notification;
    /// later appends to the same archive stay quiet.
    pub fn take_notification_slot(&mut self) -> bool {
        if self.notified {
            false
        } else {
            self.notified = true;
            true
        }
    }
}

/// Holds at most one live session. A new seed key or an idle timeout
/// discards the previous session wholesale: counters, dedup sets, and the
/// archive slot all start over.
#[derive(Debug)]
pub struct SessionStore {
    current: Option<SessionState>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            current: None,
            idle_timeout,
        }
    }

    pub fn resolve(&mut self, seed: &serde_json::Value, now: DateTime<Utc>) -> &mut SessionState {
        let run_key = fingerprint_of(seed);

        let reuse = match &self.current {
            Some(state) => {
                state.run_key == run_key && now - state.last_activity <= self.idle_timeout
            }
            None => false,
        };

        if !reuse {
            self.current = Some(SessionState::new(run_key, now));
        }

        let state = self.current.as_mut().unwrap();
        state.last_activity = now;
        state
    }

    pub fn current(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint_of(&json!({"b": 1, "a": 2}));
        let b = fingerprint_of(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_differs_for_different_seeds() {
        assert_ne!(fingerprint_of(&json!({"x": 1})), fingerprint_of(&json!({"x": 2})));
    }

    #[test]
    fn test_same_seed_reuses_session() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let now = Utc::now();

        store.resolve(&json!({"s": 1}), now).record_written(3);
        let state = store.resolve(&json!({"s": 1}), now + Duration::seconds(10));
        assert_eq!(state.total_written(), 3);
    }

    #[test]
    fn test_new_seed_resets_session() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let now = Utc::now();

        store.resolve(&json!({"s": 1}), now).record_written(3);
        let state = store.resolve(&json!({"s": 2}), now + Duration::seconds(1));
        assert_eq!(state.total_written(), 0);
    }

    #[test]
    fn test_idle_timeout_resets_session() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let now = Utc::now();

        store.resolve(&json!({"s": 1}), now).record_written(3);
        let state = store.resolve(&json!({"s": 1}), now + Duration::seconds(61));
        assert_eq!(state.total_written(), 0);
    }

    #[test]
    fn test_activity_extends_session() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let now = Utc::now();

        store.resolve(&json!({"s": 1}), now).record_written(1);
        store
            .resolve(&json!({"s": 1}), now + Duration::seconds(50))
            .record_written(1);
        // 50s + 50s exceeds the timeout from the start, but not from the
        // last activity
        let state = store.resolve(&json!({"s": 1}), now + Duration::seconds(100));
        assert_eq!(state.total_written(), 2);
    }

    #[test]
    fn test_counters_are_independent_per_category() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let state = store.resolve(&json!(1), Utc::now());

        assert_eq!(state.peek_index(Category::Images), 0);
        state.bump_index(Category::Images);
        state.bump_index(Category::Images);
        assert_eq!(state.peek_index(Category::Images), 2);
        assert_eq!(state.peek_index(Category::Audios), 0);
        assert_eq!(state.peek_blob_index(), 0);
        state.bump_blob_index();
        assert_eq!(state.peek_blob_index(), 1);
    }

    #[test]
    fn test_notification_slot_taken_once() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let state = store.resolve(&json!(1), Utc::now());

        assert!(state.take_notification_slot());
        assert!(!state.take_notification_slot());
    }

    #[test]
    fn test_manifest_loads_once_per_session() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let state = store.resolve(&json!(1), Utc::now());

        state.load_manifest_once(&json!({"images": ["a.png"]}));
        // second load within the session is ignored
        state.load_manifest_once(&json!({"images": ["b.png", "c.png"]}));
        assert_eq!(state.naming_mut().queued(Category::Images), 1);
    }

    #[test]
    fn test_image_dedup() {
        let mut store = SessionStore::new(Duration::seconds(60));
        let state = store.resolve(&json!(1), Utc::now());

        let signature = ImageSignature {
            width: 2,
            height: 2,
            digest: [7; 32],
        };
        assert!(!state.seen_image(&signature));
        assert!(state.admit_image(signature));
        assert!(state.seen_image(&signature));
        assert!(!state.admit_image(signature));
    }

    #[test]
    fn test_file_signature_changes_with_content_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.bin");

        std::fs::write(&path, b"one").unwrap();
        let first = FileSignature::of(&path).unwrap();
        let again = FileSignature::of(&path).unwrap();
        assert_eq!(first, again);

        std::fs::write(&path, b"longer content").unwrap();
        let changed = FileSignature::of(&path).unwrap();
        assert_ne!(first, changed);
    }
}
