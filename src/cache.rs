//! Content-addressed memoization.
//!
//! Keys are hex-encoded SHA-256 digests of `(seed || input)`, where the
//! seed folds in the target version and the option bits that influence
//! the cached output. Two implementations: a synchronized in-memory map
//! and a one-file-per-key filesystem store with a version header and
//! atomic commit. Writes are best-effort and read errors demote to a
//! miss; cache trouble never propagates to callers.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Pluggable memoization backend.
///
/// Implementations synchronize themselves; the facade shares one instance
/// across concurrent read-only use.
pub trait Cache: Send + Sync {
    /// Fetch a payload; any failure is a miss.
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    /// Store a payload, best-effort.
    fn write(&self, key: &str, bytes: &[u8]);
    /// Drop entries; `pattern` is a glob over key names, `None` clears all.
    fn clear(&self, pattern: Option<&str>);
}

/// Derive the content-addressed key for an input under a seed.
pub fn generate_key(input: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---- In-memory ----

/// Synchronized in-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), bytes.to_vec());
        }
    }

    fn clear(&self, pattern: Option<&str>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        match pattern.and_then(|p| glob::Pattern::new(p).ok()) {
            Some(matcher) => entries.retain(|k, _| !matcher.matches(k)),
            None => entries.clear(),
        }
    }
}

// ---- Filesystem ----

/// Version header prepended to every cache file; a mismatch invalidates
/// the entry.
const HEADER: &[u8; 8] = b"RXMCACH1";

/// One-file-per-key filesystem cache under a configured root.
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        // Keys are hex digests; anything else cannot address a file.
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.root.join(key))
    }
}

impl Cache for FsCache {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key)?;
        let bytes = std::fs::read(&path).ok()?;
        match bytes.strip_prefix(HEADER) {
            Some(payload) => Some(payload.to_vec()),
            None => {
                debug!(key, "stale cache header, treating as miss");
                None
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(&self.root)?;
            // Atomic commit: write aside, then rename over the target.
            let tmp = path.with_extension("tmp");
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(HEADER)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)
        })();
        if let Err(e) = result {
            warn!(key, error = %e, "cache write failed");
        }
    }

    fn clear(&self, pattern: Option<&str>) {
        let matcher = pattern.and_then(|p| glob::Pattern::new(p).ok());
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let matches = match &matcher {
                Some(m) => m.matches(&name),
                None => true,
            };
            if matches {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!(name = %name, error = %e, "cache clear failed");
                }
            }
        }
    }
}
