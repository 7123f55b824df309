//! Typed snapshot artifacts and canonical serialization.
//!
//! Every file in a snapshot directory has an explicit record type,
//! validated at the serialization boundary — no loosely-typed maps
//! threaded through the core.
//!
//! Canonical form: sorted keys, 2-space indent, UTF-8, single trailing
//! newline. `serde_json`'s default map is ordered, so routing every
//! document through [`to_canonical_json`] gives byte-deterministic
//! output for identical logical content — required for manifest hashes
//! to reproduce.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::axis::Axis;

/// Name of the composite summary file.
pub const SUMMARY_FILE: &str = "isi.json";
/// Name of the manifest file.
pub const MANIFEST_FILE: &str = "MANIFEST.json";
/// Name of the hash-summary file, written last during materialization.
pub const HASH_SUMMARY_FILE: &str = "HASH_SUMMARY.json";

/// Min/max/mean statistics embedded in summary and axis documents.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// One row of the composite summary (`isi.json`).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// 2-letter country code.
    pub country: String,
    /// English short name.
    pub country_name: String,
    pub axis_1_financial: Option<f64>,
    pub axis_2_energy: Option<f64>,
    pub axis_3_technology: Option<f64>,
    pub axis_4_defense: Option<f64>,
    pub axis_5_critical_inputs: Option<f64>,
    pub axis_6_logistics: Option<f64>,
    /// Composite index; present only when all six axes are present.
    pub isi_composite: Option<f64>,
    /// Classification under the snapshot's methodology.
    pub classification: Option<String>,
    /// True when all six axis scores are present.
    pub complete: bool,
}

impl SummaryRow {
    /// Score for one axis, by axis rather than by field name.
    #[must_use]
    pub fn axis_score(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Financial => self.axis_1_financial,
            Axis::Energy => self.axis_2_energy,
            Axis::Technology => self.axis_3_technology,
            Axis::Defense => self.axis_4_defense,
            Axis::CriticalInputs => self.axis_5_critical_inputs,
            Axis::Logistics => self.axis_6_logistics,
        }
    }

    /// Sets the score for one axis.
    pub fn set_axis_score(&mut self, axis: Axis, score: f64) {
        let slot = match axis {
            Axis::Financial => &mut self.axis_1_financial,
            Axis::Energy => &mut self.axis_2_energy,
            Axis::Technology => &mut self.axis_3_technology,
            Axis::Defense => &mut self.axis_4_defense,
            Axis::CriticalInputs => &mut self.axis_5_critical_inputs,
            Axis::Logistics => &mut self.axis_6_logistics,
        };
        *slot = Some(score);
    }

    /// Empty row for a country, no scores yet.
    #[must_use]
    pub fn empty(country: &str, country_name: &str) -> Self {
        Self {
            country: country.to_string(),
            country_name: country_name.to_string(),
            axis_1_financial: None,
            axis_2_energy: None,
            axis_3_technology: None,
            axis_4_defense: None,
            axis_5_critical_inputs: None,
            axis_6_logistics: None,
            isi_composite: None,
            classification: None,
            complete: false,
        }
    }
}

/// The composite summary document (`isi.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDoc {
    /// Methodology version this snapshot was computed under.
    pub version: String,
    /// Data reference window, e.g. "2022–2024".
    pub window: String,
    /// Aggregation rule name.
    pub aggregation_rule: String,
    /// Display form of the aggregation formula.
    pub formula: String,
    /// Countries with a defined composite.
    pub countries_complete: usize,
    /// Total countries listed (always 27).
    pub countries_total: usize,
    /// Composite statistics over complete countries.
    pub statistics: Statistics,
    /// Rows sorted descending by composite, alphabetical tie-break.
    pub countries: Vec<SummaryRow>,
}

/// One axis entry in a per-country detail file.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryAxisEntry {
    pub axis_id: u8,
    pub axis_slug: String,
    pub score: Option<f64>,
    pub classification: Option<String>,
}

/// Per-country detail document (`country/{CODE}.json`).
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryDoc {
    pub country: String,
    pub country_name: String,
    pub version: String,
    pub year: i32,
    pub window: String,
    pub isi_composite: Option<f64>,
    pub isi_classification: Option<String>,
    pub axes_available: usize,
    pub axes_required: usize,
    /// Exactly six entries, in axis-id order.
    pub axes: Vec<CountryAxisEntry>,
}

/// One country row in a per-axis detail file.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisCountryRow {
    pub country: String,
    pub country_name: String,
    pub score: Option<f64>,
    pub classification: Option<String>,
}

/// Per-axis detail document (`axis/{N}.json`).
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisDoc {
    pub axis_id: u8,
    pub axis_slug: String,
    pub version: String,
    pub year: i32,
    pub countries_scored: usize,
    pub statistics: Statistics,
    /// Rows sorted descending by score, alphabetical tie-break.
    pub countries: Vec<AxisCountryRow>,
}

/// One file entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the snapshot directory, forward slashes.
    pub path: String,
    /// SHA-256 hex digest of the file content.
    pub sha256: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// The snapshot manifest (`MANIFEST.json`).
///
/// Lists every data file with size and SHA-256; excludes the manifest
/// and hash summary themselves.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub generator: String,
    pub file_count: usize,
    pub files: Vec<ManifestEntry>,
}

/// The hash summary (`HASH_SUMMARY.json`), the last data file written.
///
/// Once this file exists for a (methodology, year), the snapshot is
/// frozen.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashSummary {
    pub schema_version: u32,
    pub year: i32,
    pub methodology_version: String,
    /// Aggregate hash over the sorted per-country hashes.
    pub snapshot_hash: String,
    pub computed_at: DateTime<Utc>,
    pub computed_by: String,
    pub round_precision: u32,
    /// Per-country computation hashes, keyed by country code.
    pub country_hashes: BTreeMap<String, String>,
}

/// Serializes a document to canonical JSON: sorted keys, 2-space
/// indent, single trailing newline.
///
/// # Errors
/// Propagates `serde_json` serialization failures.
pub fn to_canonical_json<T: Serialize>(doc: &T) -> Result<String, serde_json::Error> {
    // Round-trip through Value: serde_json's map is ordered, which
    // sorts object keys independent of struct field order.
    let value = serde_json::to_value(doc)?;
    let mut out = serde_json::to_string_pretty(&value)?;
    out.push('\n');
    Ok(out)
}

/// Writes a document in canonical form, creating parent directories.
///
/// Not atomic by itself — the materializer's staging-then-rename
/// protocol provides atomicity.
///
/// # Errors
/// Fails on serialization or I/O errors.
pub fn write_canonical_json<T: Serialize>(path: &Path, doc: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = to_canonical_json(doc)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, content)
}

/// SHA-256 hex digest of a file, read in 64 KiB chunks.
///
/// # Errors
/// Propagates I/O errors.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
