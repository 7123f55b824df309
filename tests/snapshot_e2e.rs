//! End-to-end snapshot lifecycle: materialize, verify, tamper, freeze.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use isidex::snapshot::validate_snapshot;
use isidex::{
    Axis, InMemoryAxisScores, Materializer, MethodologyRegistry, SnapshotResolver, SummaryDoc,
    EU27_CODES,
};

fn write_registry(dir: &Path, years: &[i32], latest_year: i32) -> PathBuf {
    let slugs = [
        "financial",
        "energy",
        "technology",
        "defense",
        "critical_inputs",
        "logistics",
    ];
    let weights: serde_json::Map<String, serde_json::Value> = slugs
        .iter()
        .map(|s| ((*s).to_string(), serde_json::json!(1.0)))
        .collect();
    let registry = serde_json::json!({
        "schema_version": 1,
        "latest": "v1.0",
        "methodologies": [{
            "methodology_version": "v1.0",
            "label": "ISI v1.0 (frozen)",
            "frozen_at": "2025-01-15T00:00:00+00:00",
            "latest_year": latest_year,
            "years_available": years,
            "aggregation_rule": "unweighted_arithmetic_mean",
            "aggregation_formula": "ISI_i = (A1_i + A2_i + A3_i + A4_i + A5_i + A6_i) / 6",
            "axis_count": 6,
            "axis_slugs": slugs,
            "axis_weights": weights,
            "classification_thresholds": [
                [0.25, "highly_concentrated"],
                [0.15, "moderately_concentrated"],
                [0.10, "mildly_concentrated"]
            ],
            "default_classification": "unconcentrated",
            "score_range": [0.0, 1.0],
            "round_precision": 8
        }]
    });
    let path = dir.join("registry.json");
    std::fs::write(&path, serde_json::to_string_pretty(&registry).unwrap()).unwrap();
    path
}

/// Deterministic scores: distinct per country, all inside [0, 1].
fn seed_scores(provider: &InMemoryAxisScores, year: i32) {
    for axis in Axis::ALL {
        let scores: BTreeMap<String, f64> = EU27_CODES
            .iter()
            .enumerate()
            .map(|(i, code)| {
                let value = i as f64 * 0.01 + f64::from(axis.id()) * 0.02;
                (code.to_string(), value)
            })
            .collect();
        provider.insert(axis, year, scores).unwrap();
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    registry: Arc<MethodologyRegistry>,
    materializer: Materializer,
}

fn fixture(years: &[i32], latest_year: i32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = write_registry(dir.path(), years, latest_year);
    let registry = Arc::new(MethodologyRegistry::load(&registry_path).unwrap());

    let provider = InMemoryAxisScores::new();
    for year in years {
        seed_scores(&provider, *year);
    }

    let root = dir.path().join("snapshots");
    let materializer = Materializer::new(&root, registry.clone(), Arc::new(provider));
    Fixture {
        _dir: dir,
        root,
        registry,
        materializer,
    }
}

fn unlock(path: &Path) {
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(path, perms).unwrap();
}

#[test]
fn materialized_snapshot_passes_full_validation() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();
    assert_eq!(dir, fx.root.join("v1.0").join("2024"));

    let report = validate_snapshot(&dir, &fx.registry, "v1.0", 2024);
    assert!(report.valid, "errors: {:?}", report.errors);
    assert_eq!(report.exit_code, 0);
    assert!(report.checks.iter().all(|c| c.passed));
}

#[test]
fn snapshot_has_complete_artifact_set_and_rank_order() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();

    for code in EU27_CODES {
        assert!(dir.join("country").join(format!("{code}.json")).is_file());
    }
    for id in 1..=6 {
        assert!(dir.join("axis").join(format!("{id}.json")).is_file());
    }
    assert!(dir.join("MANIFEST.json").is_file());
    assert!(dir.join("HASH_SUMMARY.json").is_file());

    let summary: SummaryDoc =
        serde_json::from_str(&std::fs::read_to_string(dir.join("isi.json")).unwrap()).unwrap();
    assert_eq!(summary.countries.len(), 27);
    assert_eq!(summary.countries_complete, 27);
    assert_eq!(summary.version, "v1.0");
    assert_eq!(summary.window, "2022\u{2013}2024");

    // Descending by composite; the seed makes the last code the highest.
    let composites: Vec<f64> = summary
        .countries
        .iter()
        .map(|r| r.isi_composite.unwrap())
        .collect();
    assert!(composites.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(summary.countries[0].country, "SK");
    for row in &summary.countries {
        assert!(row.complete);
        assert!(row.classification.is_some());
    }
}

#[test]
fn materialization_is_deterministic_for_identical_input() {
    let fx_a = fixture(&[2024], 2024);
    let fx_b = fixture(&[2024], 2024);
    let dir_a = fx_a.materializer.materialize(2024, "v1.0", false).unwrap();
    let dir_b = fx_b.materializer.materialize(2024, "v1.0", false).unwrap();

    // Data files are byte-identical across runs; only MANIFEST.json and
    // HASH_SUMMARY.json carry timestamps.
    let summary_a = std::fs::read(dir_a.join("isi.json")).unwrap();
    let summary_b = std::fs::read(dir_b.join("isi.json")).unwrap();
    assert_eq!(summary_a, summary_b);

    let hs_a: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir_a.join("HASH_SUMMARY.json")).unwrap())
            .unwrap();
    let hs_b: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir_b.join("HASH_SUMMARY.json")).unwrap())
            .unwrap();
    assert_eq!(hs_a["snapshot_hash"], hs_b["snapshot_hash"]);
    assert_eq!(hs_a["country_hashes"], hs_b["country_hashes"]);
}

#[test]
fn tampered_country_file_fails_manifest_check() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();

    let target = dir.join("country").join("SE.json");
    unlock(&dir);
    unlock(&dir.join("country"));
    unlock(&target);
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    doc["isi_composite"] = serde_json::json!(0.99);
    std::fs::write(&target, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let report = validate_snapshot(&dir, &fx.registry, "v1.0", 2024);
    assert!(!report.valid);
    assert_eq!(report.exit_code, 2);
    // The report names the tampered file.
    assert!(report.errors.iter().any(|e| e.contains("country/SE.json")));
}

#[test]
fn tampered_hash_summary_fails_hash_check() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();

    let target = dir.join("HASH_SUMMARY.json");
    unlock(&dir);
    unlock(&target);
    let mut hs: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    hs["country_hashes"]["SE"] = serde_json::json!("ab".repeat(32));
    std::fs::write(&target, serde_json::to_string_pretty(&hs).unwrap()).unwrap();

    // HASH_SUMMARY.json is outside the manifest, so the hash check is
    // the first to fail.
    let report = validate_snapshot(&dir, &fx.registry, "v1.0", 2024);
    assert!(!report.valid);
    assert_eq!(report.exit_code, 3);
    assert!(report.errors.iter().any(|e| e.contains("SE")));
}

#[test]
fn freeze_blocks_rematerialization_and_leaves_bytes_untouched() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();
    let before = std::fs::read(dir.join("isi.json")).unwrap();
    let hs_before = std::fs::read(dir.join("HASH_SUMMARY.json")).unwrap();

    let err = fx.materializer.materialize(2024, "v1.0", false).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("FREEZE VIOLATION"));
    assert!(msg.contains("v1.0"));
    assert!(msg.contains("2024"));

    assert_eq!(std::fs::read(dir.join("isi.json")).unwrap(), before);
    assert_eq!(std::fs::read(dir.join("HASH_SUMMARY.json")).unwrap(), hs_before);
}

#[test]
fn force_replaces_existing_snapshot() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();
    let dir2 = fx.materializer.materialize(2024, "v1.0", true).unwrap();
    assert_eq!(dir, dir2);

    let report = validate_snapshot(&dir2, &fx.registry, "v1.0", 2024);
    assert!(report.valid, "errors: {:?}", report.errors);
}

#[test]
fn no_staging_directory_survives_success() {
    let fx = fixture(&[2024], 2024);
    fx.materializer.materialize(2024, "v1.0", false).unwrap();

    let leftovers: Vec<String> = std::fs::read_dir(&fx.root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp_"))
        .collect();
    assert!(leftovers.is_empty(), "staging leftovers: {leftovers:?}");
}

#[test]
fn resolver_serves_valid_snapshot_with_defaults() {
    let fx = fixture(&[2024], 2024);
    fx.materializer.materialize(2024, "v1.0", false).unwrap();

    let resolver = SnapshotResolver::new(&fx.root, fx.registry.clone());
    let handle = resolver.resolve(None, None).unwrap();
    assert_eq!(handle.methodology_version, "v1.0");
    assert_eq!(handle.year, 2024);
    assert_eq!(handle.data_window, "2022\u{2013}2024");
    assert_eq!(handle.snapshot_hash.len(), 64);
    assert!(handle.path.ends_with("v1.0/2024"));

    assert_eq!(resolver.list_available(), vec![("v1.0".to_string(), 2024)]);
}

#[test]
fn strict_resolver_refuses_tampered_snapshot() {
    let fx = fixture(&[2024], 2024);
    let dir = fx.materializer.materialize(2024, "v1.0", false).unwrap();

    let target = dir.join("isi.json");
    unlock(&dir);
    unlock(&target);
    let raw = std::fs::read_to_string(&target).unwrap();
    std::fs::write(&target, raw.replace("Sweden", "Svealand")).unwrap();

    let resolver = SnapshotResolver::new(&fx.root, fx.registry.clone());
    let err = resolver.resolve(Some("v1.0"), Some(2024)).unwrap_err();
    assert!(err.detail.contains("integrity"));
    assert!(resolver.list_available().is_empty());
}
