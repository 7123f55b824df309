//! Snapshot resolution: request parameters to an on-disk snapshot.
//!
//! The resolver turns an optional (methodology, year) pair into a
//! [`SnapshotHandle`] for a published snapshot, applying registry
//! defaults for whichever parameter is absent. In strict mode every
//! snapshot passes full integrity validation before it is first served;
//! the verdict, pass or fail, is cached for the process lifetime so the
//! 161-hash recomputation runs once per snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::artifact::{HashSummary, SummaryDoc, HASH_SUMMARY_FILE, SUMMARY_FILE};
use crate::error::SnapshotNotFound;
use crate::methodology::MethodologyRegistry;
use crate::snapshot::integrity::validate_snapshot;

/// A resolved, published snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHandle {
    /// Methodology version the snapshot was computed under.
    pub methodology_version: String,
    /// Snapshot year.
    pub year: i32,
    /// Absolute path of the snapshot directory.
    pub path: PathBuf,
    /// Data reference window, e.g. "2022–2024".
    pub data_window: String,
    /// Aggregate computation hash from `HASH_SUMMARY.json`.
    pub snapshot_hash: String,
}

/// Resolves (methodology, year) requests against the snapshot root.
pub struct SnapshotResolver {
    root: PathBuf,
    registry: Arc<MethodologyRegistry>,
    strict: bool,
    // Per-process validation verdicts, keyed by (methodology, year).
    // Failures are cached too: a snapshot that failed once is broken on
    // disk and stays broken until the process restarts.
    validated: Mutex<HashMap<(String, i32), bool>>,
}

impl SnapshotResolver {
    /// Resolver over `root` in strict mode (full validation before a
    /// snapshot is first served).
    #[must_use]
    pub fn new(root: impl AsRef<Path>, registry: Arc<MethodologyRegistry>) -> Self {
        Self::with_strict(root, registry, true)
    }

    /// Resolver with an explicit strict setting. Non-strict skips
    /// integrity validation and is meant for local development only.
    #[must_use]
    pub fn with_strict(
        root: impl AsRef<Path>,
        registry: Arc<MethodologyRegistry>,
        strict: bool,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            registry,
            strict,
            validated: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a request to a published snapshot.
    ///
    /// `methodology` defaults to the registry's latest version and
    /// `year` to that methodology's latest year. In strict mode the
    /// snapshot must pass full integrity validation.
    ///
    /// # Errors
    /// Returns [`SnapshotNotFound`] for an unknown methodology, a year
    /// outside `years_available`, a missing snapshot directory, or a
    /// snapshot that fails validation.
    pub fn resolve(
        &self,
        methodology: Option<&str>,
        year: Option<i32>,
    ) -> Result<SnapshotHandle, SnapshotNotFound> {
        let version = methodology
            .unwrap_or_else(|| self.registry.latest_version())
            .to_string();

        let entry = self.registry.get(&version).map_err(|e| SnapshotNotFound {
            methodology: version.clone(),
            year: year.unwrap_or(0),
            detail: format!("{e}"),
        })?;

        let year = year.unwrap_or(entry.latest_year);
        let not_found = |detail: String| SnapshotNotFound {
            methodology: version.clone(),
            year,
            detail,
        };

        if !entry.years_available.contains(&year) {
            return Err(not_found(format!(
                "year {year} is not available under methodology '{version}' \
                 (available: {:?})",
                entry.years_available
            )));
        }

        let dir = self.snapshot_dir(&version, year);
        if !dir.is_dir() {
            return Err(not_found(format!(
                "snapshot directory does not exist: {}",
                dir.display()
            )));
        }
        if !dir.join(SUMMARY_FILE).is_file() {
            return Err(not_found(format!(
                "snapshot at {} has no {SUMMARY_FILE}",
                dir.display()
            )));
        }

        if self.strict && !self.check_integrity(&version, year, &dir) {
            return Err(not_found(
                "snapshot failed integrity validation and will not be served".to_string(),
            ));
        }

        let summary: SummaryDoc = read_json(&dir.join(SUMMARY_FILE))
            .map_err(|detail| not_found(detail))?;
        let hash_summary: HashSummary = read_json(&dir.join(HASH_SUMMARY_FILE))
            .map_err(|detail| not_found(detail))?;

        Ok(SnapshotHandle {
            methodology_version: version,
            year,
            path: dir,
            data_window: summary.window,
            snapshot_hash: hash_summary.snapshot_hash,
        })
    }

    /// Lists (methodology, year) pairs that resolve successfully.
    #[must_use]
    pub fn list_available(&self) -> Vec<(String, i32)> {
        let mut out = Vec::new();
        for version in self.registry.versions() {
            let Ok(years) = self.registry.years_available(version) else {
                continue;
            };
            for year in years {
                if self.resolve(Some(version), Some(year)).is_ok() {
                    out.push((version.to_string(), year));
                }
            }
        }
        out
    }

    fn snapshot_dir(&self, version: &str, year: i32) -> PathBuf {
        self.root.join(version).join(year.to_string())
    }

    fn check_integrity(&self, version: &str, year: i32, dir: &Path) -> bool {
        let key = (version.to_string(), year);
        {
            let guard = match self.validated.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(verdict) = guard.get(&key) {
                return *verdict;
            }
        }

        // Validation runs outside the lock; a concurrent duplicate run
        // reaches the same verdict.
        let report = validate_snapshot(dir, &self.registry, version, year);
        if !report.valid {
            eprintln!(
                "WARNING: snapshot {version}/{year} failed integrity validation: {:?}",
                report.errors
            );
        }

        let mut guard = match self.validated.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard.entry(key).or_insert(report.valid)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methodology::test_support::{methodology_v1, registry_json};

    fn registry(dir: &Path, years: Vec<i32>, latest: i32) -> Arc<MethodologyRegistry> {
        let m = methodology_v1(years, latest);
        let path = dir.join("registry.json");
        std::fs::write(&path, registry_json(&m)).unwrap();
        Arc::new(MethodologyRegistry::load(&path).unwrap())
    }

    #[test]
    fn unknown_methodology_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2024], 2024);
        let resolver = SnapshotResolver::new(dir.path().join("snapshots"), reg);
        let err = resolver.resolve(Some("v9.9"), Some(2024)).unwrap_err();
        assert_eq!(err.methodology, "v9.9");
        assert!(err.detail.contains("v9.9"));
    }

    #[test]
    fn unavailable_year_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2023, 2024], 2024);
        let resolver = SnapshotResolver::new(dir.path().join("snapshots"), reg);
        let err = resolver.resolve(None, Some(2031)).unwrap_err();
        assert_eq!(err.year, 2031);
        assert!(err.detail.contains("not available"));
    }

    #[test]
    fn defaults_come_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2023, 2024], 2024);
        let resolver = SnapshotResolver::new(dir.path().join("snapshots"), reg);
        // Both defaults resolve before the directory check, so the
        // error names the defaulted pair.
        let err = resolver.resolve(None, None).unwrap_err();
        assert_eq!(err.methodology, "v1.0");
        assert_eq!(err.year, 2024);
        assert!(err.detail.contains("does not exist"));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2024], 2024);
        let resolver = SnapshotResolver::new(dir.path().join("snapshots"), reg);
        let err = resolver.resolve(Some("v1.0"), Some(2024)).unwrap_err();
        assert!(err.detail.contains("does not exist"));
    }

    #[test]
    fn strict_mode_rejects_incomplete_snapshot_and_caches_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2024], 2024);
        let root = dir.path().join("snapshots");
        // Directory with a summary file but nothing else: resolvable
        // paths exist, validation fails.
        let snap = root.join("v1.0").join("2024");
        std::fs::create_dir_all(&snap).unwrap();
        std::fs::write(snap.join(SUMMARY_FILE), "{}").unwrap();

        let resolver = SnapshotResolver::new(&root, reg);
        let err = resolver.resolve(Some("v1.0"), Some(2024)).unwrap_err();
        assert!(err.detail.contains("integrity"));

        // Second resolve hits the cached failure.
        let err = resolver.resolve(Some("v1.0"), Some(2024)).unwrap_err();
        assert!(err.detail.contains("integrity"));
        let guard = resolver.validated.lock().unwrap();
        assert_eq!(guard.get(&("v1.0".to_string(), 2024)), Some(&false));
    }

    #[test]
    fn non_strict_serves_unvalidated_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), vec![2024], 2024);
        let root = dir.path().join("snapshots");
        let snap = root.join("v1.0").join("2024");
        std::fs::create_dir_all(&snap).unwrap();

        let summary = serde_json::json!({
            "version": "v1.0",
            "window": "2022\u{2013}2024",
            "aggregation_rule": "unweighted_arithmetic_mean",
            "formula": "mean",
            "countries_complete": 0,
            "countries_total": 27,
            "statistics": {"min": 0.0, "max": 0.0, "mean": 0.0},
            "countries": [],
        });
        std::fs::write(snap.join(SUMMARY_FILE), summary.to_string()).unwrap();
        let hs = serde_json::json!({
            "schema_version": 1,
            "year": 2024,
            "methodology_version": "v1.0",
            "snapshot_hash": "ab".repeat(32),
            "computed_at": "2025-01-15T00:00:00Z",
            "computed_by": "isidex",
            "round_precision": 8,
            "country_hashes": {"SE": "cd".repeat(32)},
        });
        std::fs::write(snap.join(HASH_SUMMARY_FILE), hs.to_string()).unwrap();

        let resolver = SnapshotResolver::with_strict(&root, reg, false);
        let handle = resolver.resolve(Some("v1.0"), Some(2024)).unwrap();
        assert_eq!(handle.year, 2024);
        assert_eq!(handle.data_window, "2022\u{2013}2024");
        assert_eq!(handle.snapshot_hash, "ab".repeat(32));
        assert!(resolver.list_available().contains(&("v1.0".to_string(), 2024)));
    }
}
