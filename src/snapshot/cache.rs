//! Bounded in-memory cache for published snapshot artifacts.
//!
//! Snapshots are immutable once published, so cached artifacts never go
//! stale; the cache exists to bound memory, not to manage freshness.
//! Keys are two-level: a snapshot slot per (methodology, year), and
//! artifact entries within each slot. Eviction removes a whole slot,
//! least recently used first.
//!
//! Artifact keys are logical names ("isi", "country:SE", "axis:3",
//! "manifest", "hash_summary"), validated lexically and then checked
//! against the canonicalized snapshot directory before any file read.
//! The cache never constructs a path from unvalidated input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::artifact::{HASH_SUMMARY_FILE, MANIFEST_FILE, SUMMARY_FILE};
use crate::error::CacheError;

/// Default number of snapshot slots.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 3;

type SlotKey = (String, i32);

struct Slot {
    artifacts: HashMap<String, Arc<serde_json::Value>>,
    // Monotone counter value at last access, for LRU ordering.
    last_used: u64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Occupied snapshot slots.
    pub slots: usize,
    /// Slot capacity.
    pub max_slots: usize,
    /// Artifact hits since construction.
    pub hits: u64,
    /// Artifact misses (loads from disk) since construction.
    pub misses: u64,
    /// Whole-slot evictions since construction.
    pub evictions: u64,
}

struct CacheInner {
    slots: HashMap<SlotKey, Slot>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded per-snapshot artifact cache.
///
/// The lock is held only around map operations; file reads and JSON
/// parsing happen outside it. Safe to share behind an `Arc` across
/// request handlers.
pub struct SnapshotCache {
    max_slots: usize,
    inner: Mutex<CacheInner>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}

impl SnapshotCache {
    /// Cache holding at most `max_slots` snapshots. A zero capacity is
    /// promoted to one.
    #[must_use]
    pub fn new(max_slots: usize) -> Self {
        Self {
            max_slots: max_slots.max(1),
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Returns one artifact from a published snapshot, loading and
    /// caching it on first access.
    ///
    /// `Ok(None)` means the artifact file does not exist in the
    /// snapshot directory; structural errors are `Err`.
    ///
    /// # Errors
    /// Fails on an unknown artifact key, a path escaping the snapshot
    /// directory, or an unreadable or unparsable artifact file.
    pub fn get_artifact(
        &self,
        methodology: &str,
        year: i32,
        snapshot_dir: &Path,
        artifact: &str,
    ) -> Result<Option<Arc<serde_json::Value>>, CacheError> {
        let key = slot_key(methodology, year)?;

        if let Some(cached) = self.lookup(&key, artifact) {
            return Ok(Some(cached));
        }

        // Load outside the lock. Concurrent loaders of the same artifact
        // duplicate the read; last insert wins with identical content.
        let rel = artifact_rel_path(artifact)?;
        let path = resolve_artifact_path(snapshot_dir, &rel, artifact)?;
        let Some(path) = path else {
            return Ok(None);
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| CacheError::Parse { path, source })?;
        let value = Arc::new(value);

        self.insert(key, artifact, Arc::clone(&value));
        Ok(Some(value))
    }

    /// Drops cached slots. `None` matches everything in that position:
    /// `invalidate(None, None)` clears the cache, `invalidate(Some(m),
    /// None)` drops every year of one methodology. Returns the number of
    /// slots dropped.
    ///
    /// Published snapshots are immutable, so this is only needed after
    /// a force re-materialization in development.
    pub fn invalidate(&self, methodology: Option<&str>, year: Option<i32>) -> usize {
        let mut inner = self.lock();
        let before = inner.slots.len();
        inner.slots.retain(|(m, y), _| {
            let m_match = methodology.map_or(true, |want| want == m);
            let y_match = year.map_or(true, |want| want == *y);
            !(m_match && y_match)
        });
        before - inner.slots.len()
    }

    /// Number of occupied snapshot slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            slots: inner.slots.len(),
            max_slots: self.max_slots,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lookup(&self, key: &SlotKey, artifact: &str) -> Option<Arc<serde_json::Value>> {
        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;
        if let Some(slot) = inner.slots.get_mut(key) {
            slot.last_used = now;
            if let Some(value) = slot.artifacts.get(artifact) {
                let value = Arc::clone(value);
                inner.hits += 1;
                return Some(value);
            }
        }
        inner.misses += 1;
        None
    }

    fn insert(&self, key: SlotKey, artifact: &str, value: Arc<serde_json::Value>) {
        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;

        if !inner.slots.contains_key(&key) && inner.slots.len() >= self.max_slots {
            // Evict the least recently used slot wholesale.
            if let Some(victim) = inner
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.slots.remove(&victim);
                inner.evictions += 1;
            }
        }

        let slot = inner.slots.entry(key).or_insert_with(|| Slot {
            artifacts: HashMap::new(),
            last_used: now,
        });
        slot.last_used = now;
        slot.artifacts.insert(artifact.to_string(), value);
    }
}

fn slot_key(methodology: &str, year: i32) -> Result<SlotKey, CacheError> {
    let valid = !methodology.is_empty()
        && methodology
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if !valid {
        return Err(CacheError::InvalidKey {
            reason: format!("methodology '{methodology}' contains invalid characters"),
        });
    }
    if !(1900..=9999).contains(&year) {
        return Err(CacheError::InvalidKey {
            reason: format!("year {year} out of range"),
        });
    }
    Ok((methodology.to_string(), year))
}

/// Maps a logical artifact key to its relative path inside a snapshot.
///
/// Accepted keys: "isi", "manifest", "hash_summary", "country:{CODE}"
/// with a two-letter uppercase code, "axis:{N}" with N in 1..=6.
fn artifact_rel_path(artifact: &str) -> Result<String, CacheError> {
    match artifact {
        "isi" => return Ok(SUMMARY_FILE.to_string()),
        "manifest" => return Ok(MANIFEST_FILE.to_string()),
        "hash_summary" => return Ok(HASH_SUMMARY_FILE.to_string()),
        _ => {}
    }

    if let Some(code) = artifact.strip_prefix("country:") {
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()) {
            return Ok(format!("country/{code}.json"));
        }
        return Err(CacheError::UnknownArtifact {
            artifact: artifact.to_string(),
        });
    }

    if let Some(id) = artifact.strip_prefix("axis:") {
        if matches!(id, "1" | "2" | "3" | "4" | "5" | "6") {
            return Ok(format!("axis/{id}.json"));
        }
    }

    Err(CacheError::UnknownArtifact {
        artifact: artifact.to_string(),
    })
}

/// Joins and canonicalizes, rejecting anything that escapes the
/// snapshot directory. `Ok(None)` means the artifact file is absent.
fn resolve_artifact_path(
    snapshot_dir: &Path,
    rel: &str,
    artifact: &str,
) -> Result<Option<PathBuf>, CacheError> {
    let base = snapshot_dir
        .canonicalize()
        .map_err(|source| CacheError::Io {
            path: snapshot_dir.to_path_buf(),
            source,
        })?;

    let candidate = base.join(rel);
    if !candidate.is_file() {
        return Ok(None);
    }

    let resolved = candidate.canonicalize().map_err(|source| CacheError::Io {
        path: candidate.clone(),
        source,
    })?;
    if !resolved.starts_with(&base) {
        return Err(CacheError::PathTraversal {
            artifact: artifact.to_string(),
            snapshot_dir: base,
        });
    }
    Ok(Some(resolved))
}
