//! Snapshot integrity validation.
//!
//! [`validate_snapshot`] independently re-derives everything a
//! materialized snapshot claims: file inventory, manifest SHA-256s,
//! per-country and aggregate computation hashes, structural invariants,
//! and methodology consistency. It never returns an error — every
//! outcome, pass or fail, lands in the [`IntegrityReport`].
//!
//! A snapshot failing any check must never be served; the resolver's
//! strict mode enforces that.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::artifact::{
    sha256_file, AxisDoc, CountryDoc, HashSummary, Manifest, SummaryDoc, HASH_SUMMARY_FILE,
    MANIFEST_FILE, SUMMARY_FILE,
};
use crate::axis::Axis;
use crate::constants::{EU27_CODES, NUM_AXES, ROUND_PRECISION};
use crate::hashing::{country_hash, snapshot_hash};
use crate::methodology::MethodologyRegistry;

/// Failure categories, ordered by check-run order. The numeric value is
/// the verification CLI's exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    /// Expected snapshot files absent (exit 1).
    MissingFiles,
    /// Manifest SHA-256 recomputation failed (exit 2).
    ManifestMismatch,
    /// Per-country or aggregate hash mismatch (exit 3).
    HashMismatch,
    /// Data-shape, range, rank, or classification violation (exit 4).
    StructuralInvariant,
    /// Methodology or precision inconsistency (exit 5).
    MethodologyMismatch,
}

impl CheckCategory {
    /// CLI exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            CheckCategory::MissingFiles => 1,
            CheckCategory::ManifestMismatch => 2,
            CheckCategory::HashMismatch => 3,
            CheckCategory::StructuralInvariant => 4,
            CheckCategory::MethodologyMismatch => 5,
        }
    }
}

/// Outcome of one validation check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Check name, stable across releases.
    pub check: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail.
    pub detail: String,
}

/// Structured report from snapshot validation.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    /// True only if every check passed.
    pub valid: bool,
    /// Methodology version being validated.
    pub methodology_version: String,
    /// Snapshot year being validated.
    pub year: i32,
    /// Exit code: 0 when valid, otherwise the first failing category.
    pub exit_code: i32,
    /// Every check run, in order.
    pub checks: Vec<CheckResult>,
    /// Flat list of failure messages (all failures, not just the first).
    pub errors: Vec<String>,
}

impl IntegrityReport {
    fn new(methodology_version: &str, year: i32) -> Self {
        Self {
            valid: true,
            methodology_version: methodology_version.to_string(),
            year,
            exit_code: 0,
            checks: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn ok(&mut self, check: &str, detail: impl Into<String>) {
        self.checks.push(CheckResult {
            check: check.to_string(),
            passed: true,
            detail: detail.into(),
        });
    }

    fn fail(&mut self, check: &str, detail: impl Into<String>, category: CheckCategory) {
        let detail = detail.into();
        self.valid = false;
        self.errors.push(format!("[{check}] {detail}"));
        self.checks.push(CheckResult {
            check: check.to_string(),
            passed: false,
            detail,
        });
        // First failing check (in run order) fixes the reported category.
        if self.exit_code == 0 {
            self.exit_code = category.exit_code();
        }
    }
}

/// Relative paths every snapshot must contain.
#[must_use]
pub fn expected_files() -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    files.insert(SUMMARY_FILE.to_string());
    files.insert(MANIFEST_FILE.to_string());
    files.insert(HASH_SUMMARY_FILE.to_string());
    for axis in Axis::ALL {
        files.insert(format!("axis/{}.json", axis.id()));
    }
    for code in EU27_CODES {
        files.insert(format!("country/{code}.json"));
    }
    files
}

/// Validates a snapshot directory for full structural integrity.
///
/// Runs all five check categories in order and continues past failures
/// so the report is fully diagnosable; checks whose inputs are missing
/// record their own failure instead of being skipped silently.
#[must_use]
pub fn validate_snapshot(
    snapshot_dir: &Path,
    registry: &MethodologyRegistry,
    methodology_version: &str,
    year: i32,
) -> IntegrityReport {
    let mut report = IntegrityReport::new(methodology_version, year);

    if !snapshot_dir.is_dir() {
        report.fail(
            "directory_exists",
            format!("snapshot directory does not exist: {}", snapshot_dir.display()),
            CheckCategory::MissingFiles,
        );
        return report;
    }
    report.ok("directory_exists", snapshot_dir.display().to_string());

    check_file_inventory(snapshot_dir, &mut report);
    check_manifest(snapshot_dir, &mut report);
    check_hash_summary(snapshot_dir, registry, methodology_version, year, &mut report);
    check_structural_invariants(snapshot_dir, registry, methodology_version, &mut report);
    check_methodology_consistency(snapshot_dir, methodology_version, &mut report);

    report
}

fn actual_files(snapshot_dir: &Path) -> std::io::Result<BTreeSet<String>> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeSet<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(base, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(rel);
            }
        }
        Ok(())
    }
    let mut out = BTreeSet::new();
    walk(snapshot_dir, snapshot_dir, &mut out)?;
    Ok(out)
}

fn check_file_inventory(snapshot_dir: &Path, report: &mut IntegrityReport) {
    let expected = expected_files();
    let actual = match actual_files(snapshot_dir) {
        Ok(set) => set,
        Err(e) => {
            report.fail(
                "directory_structure",
                format!("cannot list snapshot files: {e}"),
                CheckCategory::MissingFiles,
            );
            return;
        }
    };

    let missing: Vec<&String> = expected.difference(&actual).collect();
    if !missing.is_empty() {
        report.fail(
            "directory_structure",
            format!("missing files: {missing:?}"),
            CheckCategory::MissingFiles,
        );
        return;
    }

    let unexpected: Vec<&String> = actual.difference(&expected).collect();
    if unexpected.is_empty() {
        report.ok(
            "directory_structure",
            format!("all {} expected files present", expected.len()),
        );
    } else {
        // Extras are tolerated but noted.
        report.ok(
            "directory_structure",
            format!(
                "all {} expected files present; unexpected files (allowed): {unexpected:?}",
                expected.len()
            ),
        );
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

fn check_manifest(snapshot_dir: &Path, report: &mut IntegrityReport) {
    let manifest_path = snapshot_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        report.fail(
            "manifest_consistency",
            "MANIFEST.json not found",
            CheckCategory::ManifestMismatch,
        );
        return;
    }

    let manifest: Manifest = match load_json(&manifest_path) {
        Ok(m) => m,
        Err(e) => {
            report.fail("manifest_consistency", e, CheckCategory::ManifestMismatch);
            return;
        }
    };

    if manifest.files.is_empty() {
        report.fail(
            "manifest_consistency",
            "MANIFEST.json contains no file entries",
            CheckCategory::ManifestMismatch,
        );
        return;
    }

    let mut missing = Vec::new();
    let mut mismatches = Vec::new();
    let mut checked = 0usize;

    for entry in &manifest.files {
        if entry.path.split('/').any(|c| c.is_empty() || c == "..") {
            mismatches.push(format!("{}: invalid manifest path", entry.path));
            continue;
        }
        let path = snapshot_dir.join(&entry.path);
        if !path.is_file() {
            missing.push(entry.path.clone());
            continue;
        }
        match sha256_file(&path) {
            Ok(actual) => {
                checked += 1;
                if actual != entry.sha256 {
                    mismatches.push(format!(
                        "{}: expected {}…, got {}…",
                        entry.path,
                        &entry.sha256[..16.min(entry.sha256.len())],
                        &actual[..16]
                    ));
                }
            }
            Err(e) => mismatches.push(format!("{}: {e}", entry.path)),
        }
    }

    if !missing.is_empty() {
        report.fail(
            "manifest_consistency",
            format!("missing files referenced in manifest: {missing:?}"),
            CheckCategory::ManifestMismatch,
        );
        return;
    }
    if !mismatches.is_empty() {
        report.fail(
            "manifest_consistency",
            format!("SHA-256 mismatches ({}): {mismatches:?}", mismatches.len()),
            CheckCategory::ManifestMismatch,
        );
        return;
    }

    report.ok(
        "manifest_consistency",
        format!("all {checked} files verified against MANIFEST.json"),
    );
}

fn check_hash_summary(
    snapshot_dir: &Path,
    registry: &MethodologyRegistry,
    methodology_version: &str,
    year: i32,
    report: &mut IntegrityReport,
) {
    let hs: HashSummary = match load_json(&snapshot_dir.join(HASH_SUMMARY_FILE)) {
        Ok(hs) => hs,
        Err(e) => {
            report.fail("hash_summary", e, CheckCategory::HashMismatch);
            return;
        }
    };
    if hs.country_hashes.is_empty() {
        report.fail(
            "hash_summary",
            "HASH_SUMMARY.json has no country hashes",
            CheckCategory::HashMismatch,
        );
        return;
    }

    let summary: SummaryDoc = match load_json(&snapshot_dir.join(SUMMARY_FILE)) {
        Ok(s) => s,
        Err(e) => {
            report.fail("hash_summary", e, CheckCategory::HashMismatch);
            return;
        }
    };

    let methodology = match registry.get(methodology_version) {
        Ok(m) => m,
        Err(e) => {
            report.fail(
                "hash_summary",
                format!("{e}"),
                CheckCategory::MethodologyMismatch,
            );
            return;
        }
    };

    let rows: BTreeMap<&str, &crate::artifact::SummaryRow> = summary
        .countries
        .iter()
        .map(|r| (r.country.as_str(), r))
        .collect();

    let mut recomputed: BTreeMap<String, String> = BTreeMap::new();
    let mut mismatches = Vec::new();

    for code in EU27_CODES {
        let Some(row) = rows.get(code) else {
            mismatches.push(format!("{code}: not found in summary rows"));
            continue;
        };

        let mut by_slug: BTreeMap<String, f64> = BTreeMap::new();
        for axis in Axis::ALL {
            if let Some(score) = row.axis_score(axis) {
                by_slug.insert(axis.slug().to_string(), score);
            }
        }
        let Some(composite) = row.isi_composite else {
            mismatches.push(format!("{code}: summary row has no composite"));
            continue;
        };

        let hash = country_hash(code, year, &by_slug, composite, &summary.window, methodology);
        let stored = hs.country_hashes.get(code).map(String::as_str).unwrap_or("");
        if hash != stored {
            mismatches.push(format!(
                "{code}: stored {}… != recomputed {}…",
                &stored[..16.min(stored.len())],
                &hash[..16]
            ));
        }
        recomputed.insert(code.to_string(), hash);
    }

    if !mismatches.is_empty() {
        report.fail(
            "hash_summary",
            format!("country hash mismatches ({}): {mismatches:?}", mismatches.len()),
            CheckCategory::HashMismatch,
        );
        return;
    }

    match snapshot_hash(&recomputed) {
        Ok(agg) if agg == hs.snapshot_hash => {
            report.ok(
                "hash_summary",
                format!(
                    "all {} country hashes + snapshot hash verified",
                    recomputed.len()
                ),
            );
        }
        Ok(agg) => {
            report.fail(
                "hash_summary",
                format!(
                    "snapshot hash mismatch: stored {}… != recomputed {}…",
                    &hs.snapshot_hash[..16.min(hs.snapshot_hash.len())],
                    &agg[..16]
                ),
                CheckCategory::HashMismatch,
            );
        }
        Err(e) => {
            report.fail("hash_summary", format!("{e}"), CheckCategory::HashMismatch);
        }
    }
}

fn check_structural_invariants(
    snapshot_dir: &Path,
    registry: &MethodologyRegistry,
    methodology_version: &str,
    report: &mut IntegrityReport,
) {
    let summary: SummaryDoc = match load_json(&snapshot_dir.join(SUMMARY_FILE)) {
        Ok(s) => s,
        Err(e) => {
            report.fail("structural_invariants", e, CheckCategory::StructuralInvariant);
            return;
        }
    };

    let methodology = registry.get(methodology_version).ok();
    let mut violations: Vec<String> = Vec::new();

    if summary.countries.len() != EU27_CODES.len() {
        violations.push(format!(
            "expected 27 countries, found {}",
            summary.countries.len()
        ));
    }

    let actual_codes: BTreeSet<&str> =
        summary.countries.iter().map(|r| r.country.as_str()).collect();
    let expected_codes: BTreeSet<&str> = EU27_CODES.iter().copied().collect();
    for missing in expected_codes.difference(&actual_codes) {
        violations.push(format!("missing country: {missing}"));
    }
    for extra in actual_codes.difference(&expected_codes) {
        violations.push(format!("unexpected country: {extra}"));
    }

    for row in &summary.countries {
        let code = &row.country;
        let Some(composite) = row.isi_composite else {
            violations.push(format!("{code}: composite is null"));
            continue;
        };
        if !(0.0..=1.0).contains(&composite) {
            violations.push(format!("{code}: composite {composite} outside [0,1]"));
        }
        if let Some(m) = methodology {
            let expected = m.classify(composite);
            let actual = row.classification.as_deref().unwrap_or("");
            if actual != expected {
                violations.push(format!(
                    "{code}: classification '{actual}' does not match expected '{expected}' \
                     for composite {composite}"
                ));
            }
        }
        for axis in Axis::ALL {
            match row.axis_score(axis) {
                None => violations.push(format!("{code}: missing axis '{}'", axis.summary_key())),
                Some(v) if !(0.0..=1.0).contains(&v) => {
                    violations.push(format!("{code}: {}={v} outside [0,1]", axis.summary_key()));
                }
                Some(_) => {}
            }
        }
    }

    // Rank ordering: the stored row order must equal the canonical sort
    // (descending composite, alphabetical tie-break).
    let mut expected_order: Vec<(&str, f64)> = summary
        .countries
        .iter()
        .map(|r| (r.country.as_str(), r.isi_composite.unwrap_or(-1.0)))
        .collect();
    expected_order.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let stored_order: Vec<&str> = summary.countries.iter().map(|r| r.country.as_str()).collect();
    let canonical_order: Vec<&str> = expected_order.iter().map(|(c, _)| *c).collect();
    if stored_order != canonical_order {
        violations.push("summary rows are not in rank order".to_string());
    }

    // Per-country files: exactly six axes each.
    for code in EU27_CODES {
        let path = snapshot_dir.join("country").join(format!("{code}.json"));
        if !path.is_file() {
            violations.push(format!("{code}: country/{code}.json not found"));
            continue;
        }
        match load_json::<CountryDoc>(&path) {
            Ok(doc) => {
                if doc.axes.len() != NUM_AXES {
                    violations.push(format!(
                        "{code}: expected {NUM_AXES} axes in country file, found {}",
                        doc.axes.len()
                    ));
                }
                for ax in &doc.axes {
                    if let Some(score) = ax.score {
                        if !(0.0..=1.0).contains(&score) {
                            violations.push(format!(
                                "{code}: axis {} score {score} outside [0,1]",
                                ax.axis_id
                            ));
                        }
                    }
                }
            }
            Err(e) => violations.push(e),
        }
    }

    // Per-axis files: exactly 27 countries each.
    for axis in Axis::ALL {
        let path = snapshot_dir.join("axis").join(format!("{}.json", axis.id()));
        if !path.is_file() {
            violations.push(format!("axis/{}.json not found", axis.id()));
            continue;
        }
        match load_json::<AxisDoc>(&path) {
            Ok(doc) => {
                if doc.countries.len() != EU27_CODES.len() {
                    violations.push(format!(
                        "axis/{}.json: expected 27 countries, found {}",
                        axis.id(),
                        doc.countries.len()
                    ));
                }
            }
            Err(e) => violations.push(e),
        }
    }

    if violations.is_empty() {
        report.ok(
            "structural_invariants",
            "27 countries, 6 axes each, ranks consistent, scores in [0,1], \
             classifications match methodology",
        );
    } else {
        report.fail(
            "structural_invariants",
            format!("{} violation(s): {violations:?}", violations.len()),
            CheckCategory::StructuralInvariant,
        );
    }
}

fn check_methodology_consistency(
    snapshot_dir: &Path,
    methodology_version: &str,
    report: &mut IntegrityReport,
) {
    let hs: HashSummary = match load_json(&snapshot_dir.join(HASH_SUMMARY_FILE)) {
        Ok(hs) => hs,
        Err(e) => {
            report.fail("methodology_consistency", e, CheckCategory::MethodologyMismatch);
            return;
        }
    };

    if hs.methodology_version != methodology_version {
        report.fail(
            "methodology_consistency",
            format!(
                "HASH_SUMMARY methodology_version='{}' does not match requested '{methodology_version}'",
                hs.methodology_version
            ),
            CheckCategory::MethodologyMismatch,
        );
        return;
    }

    if hs.round_precision != ROUND_PRECISION {
        report.fail(
            "methodology_consistency",
            format!(
                "HASH_SUMMARY round_precision={} does not match expected {ROUND_PRECISION}",
                hs.round_precision
            ),
            CheckCategory::MethodologyMismatch,
        );
        return;
    }

    report.ok(
        "methodology_consistency",
        format!("methodology '{methodology_version}' consistent across artifacts"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methodology::test_support::{methodology_v1, registry_json};

    fn registry(dir: &Path) -> MethodologyRegistry {
        let m = methodology_v1(vec![2024], 2024);
        let path = dir.join("registry.json");
        std::fs::write(&path, registry_json(&m)).unwrap();
        MethodologyRegistry::load(&path).unwrap()
    }

    #[test]
    fn expected_file_set_has_36_entries() {
        assert_eq!(expected_files().len(), 36);
        assert!(expected_files().contains("country/SE.json"));
        assert!(expected_files().contains("axis/6.json"));
    }

    #[test]
    fn missing_directory_fails_with_exit_1() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let report = validate_snapshot(&dir.path().join("v1.0/2024"), &reg, "v1.0", 2024);
        assert!(!report.valid);
        assert_eq!(report.exit_code, CheckCategory::MissingFiles.exit_code());
    }

    #[test]
    fn empty_directory_fails_on_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let snap = dir.path().join("v1.0").join("2024");
        std::fs::create_dir_all(&snap).unwrap();
        let report = validate_snapshot(&snap, &reg, "v1.0", 2024);
        assert!(!report.valid);
        assert_eq!(report.exit_code, 1);
        // Later checks still ran and reported their own failures.
        assert!(report.checks.len() > 2);
        assert!(report.errors.len() > 1);
    }

    #[test]
    fn report_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let report = validate_snapshot(&dir.path().join("missing"), &reg, "v1.0", 2024);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"valid\":false"));
        assert!(json.contains("exit_code"));
    }
}
