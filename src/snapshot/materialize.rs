//! Snapshot materialization: the atomic publish protocol.
//!
//! A snapshot becomes visible through exactly one operation — the
//! rename of a fully-written, self-verified staging directory onto the
//! final path. Any failure before that rename removes the staging
//! directory and leaves the destination untouched; no partial snapshot
//! is ever visible.
//!
//! Protocol:
//! 1. Resolve methodology parameters.
//! 2. Load and re-validate per-axis score maps.
//! 3. Freeze check (force strips protection and deletes — dev only).
//! 4. Compute per-country composites and hashes, aggregate hash.
//! 5. Write all artifacts canonically into `.tmp_{m}_{y}_{uuid}`.
//! 6. Write the manifest; write the hash summary last.
//! 7. Self-verify everything just written.
//! 8. Atomic rename onto the final path.
//! 9. Recursively strip write permission.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::artifact::{
    sha256_file, write_canonical_json, AxisCountryRow, AxisDoc, CountryAxisEntry, CountryDoc,
    HashSummary, Manifest, ManifestEntry, Statistics, SummaryDoc, SummaryRow, HASH_SUMMARY_FILE,
    MANIFEST_FILE, SUMMARY_FILE,
};
use crate::axis::Axis;
use crate::constants::{country_name, EU27_CODES, NUM_AXES, ROUND_PRECISION};
use crate::error::MaterializeError;
use crate::hashing::{country_hash, round_score, snapshot_hash};
use crate::methodology::{Methodology, MethodologyRegistry};
use crate::provider::{validate_axis_scores, AxisScoreProvider};

/// Prefix for staging directories under the snapshot root.
const STAGING_PREFIX: &str = ".tmp_";

/// Expected number of files in a complete snapshot:
/// summary + 27 countries + 6 axes + manifest + hash summary.
const EXPECTED_FILE_COUNT: usize = 1 + 27 + NUM_AXES + 1 + 1;

/// Builds immutable snapshots under a root directory.
pub struct Materializer {
    root: PathBuf,
    registry: Arc<MethodologyRegistry>,
    provider: Arc<dyn AxisScoreProvider>,
}

impl Materializer {
    /// Materializer writing under `root` (layout `{root}/{methodology}/{year}/`).
    #[must_use]
    pub fn new(
        root: impl AsRef<Path>,
        registry: Arc<MethodologyRegistry>,
        provider: Arc<dyn AxisScoreProvider>,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            registry,
            provider,
        }
    }

    /// Materializes the snapshot for (methodology, year).
    ///
    /// Returns the final snapshot directory. With `force`, an existing
    /// snapshot is unlocked and deleted first — development only.
    ///
    /// # Errors
    /// [`MaterializeError::FreezeViolation`] if the destination exists
    /// without `force`; otherwise any load, hash, verification, or I/O
    /// failure, after staging cleanup.
    pub fn materialize(
        &self,
        year: i32,
        methodology_version: &str,
        force: bool,
    ) -> Result<PathBuf, MaterializeError> {
        let methodology = self.registry.get(methodology_version)?.clone();
        let data_window = data_window_for(year);

        // Load and re-validate every axis score map.
        let mut all_scores: BTreeMap<Axis, BTreeMap<String, f64>> = BTreeMap::new();
        for axis in Axis::ALL {
            let scores = self.provider.load_axis_scores(axis, year)?;
            validate_axis_scores(axis, &scores)?;
            all_scores.insert(axis, scores);
        }

        let final_dir = self.root.join(methodology_version).join(year.to_string());
        if final_dir.exists() {
            if !force {
                return Err(MaterializeError::FreezeViolation {
                    methodology: methodology_version.to_string(),
                    year,
                    path: final_dir,
                });
            }
            eprintln!(
                "warning: force removing existing snapshot at {}",
                final_dir.display()
            );
            make_writable(&final_dir)
                .map_err(|e| MaterializeError::io("unlocking existing snapshot", e))?;
            std::fs::remove_dir_all(&final_dir)
                .map_err(|e| MaterializeError::io("removing existing snapshot", e))?;
        }

        let computed = compute_countries(&all_scores, &methodology, year, &data_window)?;
        let agg_hash = snapshot_hash(&computed.hashes)?;

        std::fs::create_dir_all(&self.root)
            .map_err(|e| MaterializeError::io("creating snapshot root", e))?;
        let staging = self.root.join(format!(
            "{STAGING_PREFIX}{methodology_version}_{year}_{}",
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        std::fs::create_dir(&staging)
            .map_err(|e| MaterializeError::io("creating staging directory", e))?;

        let result = self.write_and_verify(
            &staging,
            &all_scores,
            &computed,
            &agg_hash,
            &methodology,
            year,
            &data_window,
        );
        if let Err(err) = result {
            // Leave the destination untouched; propagate the original error.
            let _ = std::fs::remove_dir_all(&staging);
            return Err(err);
        }

        if let Some(parent) = final_dir.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MaterializeError::io("creating methodology directory", e))?;
        }
        // The single operation that makes the snapshot visible.
        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(MaterializeError::io("promoting staging directory", e));
        }

        make_readonly(&final_dir)
            .map_err(|e| MaterializeError::io("setting snapshot read-only", e))?;

        Ok(final_dir)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_and_verify(
        &self,
        staging: &Path,
        all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
        computed: &ComputedCountries,
        agg_hash: &str,
        methodology: &Methodology,
        year: i32,
        data_window: &str,
    ) -> Result<(), MaterializeError> {
        let version = &methodology.methodology_version;

        let summary = build_summary(all_scores, computed, methodology, data_window);
        write_canonical_json(&staging.join(SUMMARY_FILE), &summary)
            .map_err(|e| MaterializeError::io(SUMMARY_FILE, e))?;

        for code in EU27_CODES {
            let doc = build_country_doc(code, all_scores, computed, methodology, year, data_window);
            write_canonical_json(&staging.join("country").join(format!("{code}.json")), &doc)
                .map_err(|e| MaterializeError::io(format!("country/{code}.json"), e))?;
        }

        for axis in Axis::ALL {
            let doc = build_axis_doc(axis, all_scores, methodology, year);
            write_canonical_json(
                &staging.join("axis").join(format!("{}.json", axis.id())),
                &doc,
            )
            .map_err(|e| MaterializeError::io(format!("axis/{}.json", axis.id()), e))?;
        }

        let manifest = build_manifest(staging)?;
        write_canonical_json(&staging.join(MANIFEST_FILE), &manifest)
            .map_err(|e| MaterializeError::io(MANIFEST_FILE, e))?;

        // Hash summary is the last data file written: its presence
        // marks the snapshot frozen.
        let hash_summary = HashSummary {
            schema_version: 1,
            year,
            methodology_version: version.clone(),
            snapshot_hash: agg_hash.to_string(),
            computed_at: Utc::now(),
            computed_by: "isidex materializer".to_string(),
            round_precision: ROUND_PRECISION,
            country_hashes: computed.hashes.clone(),
        };
        write_canonical_json(&staging.join(HASH_SUMMARY_FILE), &hash_summary)
            .map_err(|e| MaterializeError::io(HASH_SUMMARY_FILE, e))?;

        self.self_verify(staging, &manifest, all_scores, computed, methodology, year, data_window)
    }

    /// Recomputes everything just written; any mismatch aborts.
    #[allow(clippy::too_many_arguments)]
    fn self_verify(
        &self,
        staging: &Path,
        manifest: &Manifest,
        all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
        computed: &ComputedCountries,
        methodology: &Methodology,
        year: i32,
        data_window: &str,
    ) -> Result<(), MaterializeError> {
        let files = list_files(staging)?;
        if files.len() != EXPECTED_FILE_COUNT {
            return Err(MaterializeError::Verification {
                reason: format!(
                    "expected {EXPECTED_FILE_COUNT} files, found {}",
                    files.len()
                ),
            });
        }

        for entry in &manifest.files {
            let path = staging.join(&entry.path);
            let actual = sha256_file(&path)
                .map_err(|e| MaterializeError::io(format!("verifying {}", entry.path), e))?;
            if actual != entry.sha256 {
                return Err(MaterializeError::Verification {
                    reason: format!("manifest hash mismatch: {}", entry.path),
                });
            }
        }

        // Determinism check: a second computation must reproduce the
        // exact hashes that were just persisted.
        let recomputed = compute_countries(all_scores, methodology, year, data_window)?;
        let recomputed_agg = snapshot_hash(&recomputed.hashes)?;
        if recomputed.hashes != computed.hashes
            || snapshot_hash(&computed.hashes)? != recomputed_agg
        {
            return Err(MaterializeError::Verification {
                reason: "snapshot hash is not reproducible".to_string(),
            });
        }

        Ok(())
    }
}

/// Removes orphaned staging directories from failed materializations.
/// Returns the number removed.
///
/// # Errors
/// Propagates directory listing failures; individual removals are
/// best-effort.
pub fn cleanup_partial_snapshots(root: &Path) -> std::io::Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_staging = name.to_string_lossy().starts_with(STAGING_PREFIX);
        if is_staging && entry.path().is_dir() {
            let _ = make_writable(&entry.path());
            if std::fs::remove_dir_all(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Data reference window for a snapshot year.
#[must_use]
pub fn data_window_for(year: i32) -> String {
    // Three-year trailing window, en dash per publication style.
    format!("{}\u{2013}{year}", year - 2)
}

struct ComputedCountries {
    /// Rounded composite per country code.
    composites: BTreeMap<String, f64>,
    /// Per-country computation hash.
    hashes: BTreeMap<String, String>,
}

fn compute_countries(
    all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
    methodology: &Methodology,
    year: i32,
    data_window: &str,
) -> Result<ComputedCountries, MaterializeError> {
    let mut composites = BTreeMap::new();
    let mut hashes = BTreeMap::new();

    for code in EU27_CODES {
        let mut by_axis: BTreeMap<Axis, f64> = BTreeMap::new();
        let mut by_slug: BTreeMap<String, f64> = BTreeMap::new();
        for axis in Axis::ALL {
            if let Some(score) = all_scores.get(&axis).and_then(|m| m.get(code)) {
                by_axis.insert(axis, *score);
                by_slug.insert(axis.slug().to_string(), *score);
            }
        }
        if by_axis.len() != NUM_AXES {
            return Err(MaterializeError::IncompleteCountry {
                country: code.to_string(),
                have: by_axis.len(),
                need: NUM_AXES,
            });
        }

        let composite = round_score(methodology.composite(&by_axis)?);
        let hash = country_hash(code, year, &by_slug, composite, data_window, methodology);
        composites.insert(code.to_string(), composite);
        hashes.insert(code.to_string(), hash);
    }

    Ok(ComputedCountries { composites, hashes })
}

fn statistics_of(values: &[f64]) -> Statistics {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Statistics {
        min: round_score(min),
        max: round_score(max),
        mean: round_score(mean),
    }
}

fn build_summary(
    all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
    computed: &ComputedCountries,
    methodology: &Methodology,
    data_window: &str,
) -> SummaryDoc {
    let mut rows: Vec<SummaryRow> = Vec::with_capacity(EU27_CODES.len());
    for code in EU27_CODES {
        let mut row = SummaryRow::empty(code, country_name(code));
        for axis in Axis::ALL {
            if let Some(score) = all_scores.get(&axis).and_then(|m| m.get(code)) {
                row.set_axis_score(axis, *score);
            }
        }
        let composite = computed.composites[code];
        row.isi_composite = Some(composite);
        row.classification = Some(methodology.classify(composite).to_string());
        row.complete = true;
        rows.push(row);
    }

    // Descending by composite, alphabetical tie-break.
    rows.sort_by(|a, b| {
        let ca = a.isi_composite.unwrap_or(-1.0);
        let cb = b.isi_composite.unwrap_or(-1.0);
        cb.partial_cmp(&ca)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.country.cmp(&b.country))
    });

    let values: Vec<f64> = rows.iter().filter_map(|r| r.isi_composite).collect();

    SummaryDoc {
        version: methodology.methodology_version.clone(),
        window: data_window.to_string(),
        aggregation_rule: match methodology.aggregation_rule {
            crate::methodology::AggregationRule::UnweightedMean => {
                "unweighted_arithmetic_mean".to_string()
            }
            crate::methodology::AggregationRule::WeightedMean => {
                "weighted_arithmetic_mean".to_string()
            }
        },
        formula: methodology.aggregation_formula.clone(),
        countries_complete: values.len(),
        countries_total: EU27_CODES.len(),
        statistics: statistics_of(&values),
        countries: rows,
    }
}

fn build_country_doc(
    code: &str,
    all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
    computed: &ComputedCountries,
    methodology: &Methodology,
    year: i32,
    data_window: &str,
) -> CountryDoc {
    let mut axes = Vec::with_capacity(NUM_AXES);
    let mut available = 0;
    for axis in Axis::ALL {
        let score = all_scores.get(&axis).and_then(|m| m.get(code)).copied();
        let classification = score.map(|s| methodology.classify(s).to_string());
        if score.is_some() {
            available += 1;
        }
        axes.push(CountryAxisEntry {
            axis_id: axis.id(),
            axis_slug: axis.slug().to_string(),
            score,
            classification,
        });
    }

    let composite = computed.composites.get(code).copied();
    CountryDoc {
        country: code.to_string(),
        country_name: country_name(code).to_string(),
        version: methodology.methodology_version.clone(),
        year,
        window: data_window.to_string(),
        isi_composite: composite,
        isi_classification: composite.map(|c| methodology.classify(c).to_string()),
        axes_available: available,
        axes_required: NUM_AXES,
        axes,
    }
}

fn build_axis_doc(
    axis: Axis,
    all_scores: &BTreeMap<Axis, BTreeMap<String, f64>>,
    methodology: &Methodology,
    year: i32,
) -> AxisDoc {
    let scores = all_scores.get(&axis);
    let mut countries: Vec<AxisCountryRow> = EU27_CODES
        .iter()
        .map(|code| {
            let score = scores.and_then(|m| m.get(*code)).copied();
            AxisCountryRow {
                country: (*code).to_string(),
                country_name: country_name(code).to_string(),
                score,
                classification: score.map(|s| methodology.classify(s).to_string()),
            }
        })
        .collect();

    countries.sort_by(|a, b| {
        let sa = a.score.unwrap_or(-1.0);
        let sb = b.score.unwrap_or(-1.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.country.cmp(&b.country))
    });

    let values: Vec<f64> = countries.iter().filter_map(|c| c.score).collect();

    AxisDoc {
        axis_id: axis.id(),
        axis_slug: axis.slug().to_string(),
        version: methodology.methodology_version.clone(),
        year,
        countries_scored: values.len(),
        statistics: statistics_of(&values),
        countries,
    }
}

fn build_manifest(staging: &Path) -> Result<Manifest, MaterializeError> {
    let mut entries = Vec::new();
    for path in list_files(staging)? {
        let rel = path
            .strip_prefix(staging)
            .map_err(|_| MaterializeError::Verification {
                reason: format!("file outside staging directory: {}", path.display()),
            })?;
        let rel_str = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if rel_str == MANIFEST_FILE || rel_str == HASH_SUMMARY_FILE {
            continue;
        }
        let sha256 = sha256_file(&path)
            .map_err(|e| MaterializeError::io(format!("hashing {rel_str}"), e))?;
        let size_bytes = std::fs::metadata(&path)
            .map_err(|e| MaterializeError::io(format!("stat {rel_str}"), e))?
            .len();
        entries.push(ManifestEntry {
            path: rel_str,
            sha256,
            size_bytes,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Manifest {
        schema_version: 1,
        generated_at: Utc::now(),
        generator: "isidex materializer".to_string(),
        file_count: entries.len(),
        files: entries,
    })
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, MaterializeError> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
    let mut out = Vec::new();
    walk(dir, &mut out).map_err(|e| MaterializeError::io("listing snapshot files", e))?;
    out.sort();
    Ok(out)
}

/// Strips write permission from every file (0o444) and directory
/// (0o555) under `dir`, the directory itself included.
pub(crate) fn make_readonly(dir: &Path) -> std::io::Result<()> {
    set_tree_permissions(dir, false)
}

/// Restores write permission so a forced deletion can proceed.
pub(crate) fn make_writable(dir: &Path) -> std::io::Result<()> {
    set_tree_permissions(dir, true)
}

fn set_tree_permissions(path: &Path, writable: bool) -> std::io::Result<()> {
    if path.is_dir() {
        // Directory first when unlocking, so children become reachable.
        if writable {
            set_permissions(path, true, true)?;
        }
        for entry in std::fs::read_dir(path)? {
            set_tree_permissions(&entry?.path(), writable)?;
        }
        if !writable {
            set_permissions(path, false, true)?;
        }
    } else {
        set_permissions(path, writable, false)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, writable: bool, is_dir: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match (writable, is_dir) {
        (true, true) => 0o755,
        (true, false) => 0o644,
        (false, true) => 0o555,
        (false, false) => 0o444,
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(path: &Path, writable: bool, _is_dir: bool) -> std::io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    let mut perms = metadata.permissions();
    perms.set_readonly(!writable);
    std::fs::set_permissions(path, perms)
}
