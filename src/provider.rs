//! Axis score providers.
//!
//! The per-axis acquisition pipelines live outside this crate; the
//! materializer consumes them through [`AxisScoreProvider`]. Providers
//! deliver pre-validated, pre-rounded scores for all 27 countries;
//! [`validate_axis_scores`] re-checks that contract at the boundary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::axis::Axis;
use crate::constants::{is_eu27, EU27_CODES};
use crate::error::ScoreError;
use crate::hashing::round_score;

/// Source of validated per-country scores for one axis and year.
pub trait AxisScoreProvider: Send + Sync {
    /// Loads the score map for one axis.
    ///
    /// The returned map must contain exactly the 27 canonical country
    /// codes, each with a finite value in `[0, 1]` rounded to the
    /// crate precision.
    ///
    /// # Errors
    /// Fails on missing data or any contract violation.
    fn load_axis_scores(&self, axis: Axis, year: i32)
        -> Result<BTreeMap<String, f64>, ScoreError>;
}

/// Checks the provider contract: exactly the EU-27 set, every value
/// finite and in `[0, 1]`.
///
/// # Errors
/// Names the first offending country or the full missing set.
pub fn validate_axis_scores(
    axis: Axis,
    scores: &BTreeMap<String, f64>,
) -> Result<(), ScoreError> {
    for (country, value) in scores {
        if !is_eu27(country) {
            return Err(ScoreError::UnknownCountry {
                axis,
                country: country.clone(),
            });
        }
        if !value.is_finite() {
            return Err(ScoreError::NotFinite {
                axis,
                country: country.clone(),
            });
        }
        if *value < 0.0 || *value > 1.0 {
            return Err(ScoreError::OutOfRange {
                axis,
                country: country.clone(),
                value: *value,
            });
        }
    }

    let missing: Vec<String> = EU27_CODES
        .iter()
        .filter(|code| !scores.contains_key(**code))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ScoreError::MissingCountries { axis, missing });
    }

    Ok(())
}

/// In-memory provider, keyed by (axis, year).
///
/// Used by tests and by callers that compute scores upstream.
#[derive(Default)]
pub struct InMemoryAxisScores {
    scores: Mutex<BTreeMap<(Axis, i32), BTreeMap<String, f64>>>,
}

impl InMemoryAxisScores {
    /// Empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the score map for one axis and year. Values are
    /// rounded once on ingest.
    ///
    /// # Errors
    /// Fails if the map violates the provider contract.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    pub fn insert(
        &self,
        axis: Axis,
        year: i32,
        scores: BTreeMap<String, f64>,
    ) -> Result<(), ScoreError> {
        validate_axis_scores(axis, &scores)?;
        let rounded = scores
            .into_iter()
            .map(|(code, v)| (code, round_score(v)))
            .collect();
        self.scores
            .lock()
            .expect("axis score lock poisoned")
            .insert((axis, year), rounded);
        Ok(())
    }
}

impl AxisScoreProvider for InMemoryAxisScores {
    fn load_axis_scores(
        &self,
        axis: Axis,
        year: i32,
    ) -> Result<BTreeMap<String, f64>, ScoreError> {
        let guard = match self.scores.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .get(&(axis, year))
            .cloned()
            .ok_or_else(|| ScoreError::FileNotFound {
                axis,
                path: PathBuf::from(format!("<memory>/{}_{year}", axis.slug())),
            })
    }
}

/// Provider reading `{dir}/{slug}_{year}.json`, each file a JSON object
/// mapping country code to score.
pub struct JsonDirScores {
    dir: PathBuf,
}

impl JsonDirScores {
    /// Provider rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl AxisScoreProvider for JsonDirScores {
    fn load_axis_scores(
        &self,
        axis: Axis,
        year: i32,
    ) -> Result<BTreeMap<String, f64>, ScoreError> {
        let path = self.dir.join(format!("{}_{year}.json", axis.slug()));
        if !path.is_file() {
            return Err(ScoreError::FileNotFound { axis, path });
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ScoreError::Io { axis, source })?;
        let parsed: BTreeMap<String, f64> = serde_json::from_str(&raw)
            .map_err(|source| ScoreError::Parse { axis, source })?;
        validate_axis_scores(axis, &parsed)?;
        Ok(parsed
            .into_iter()
            .map(|(code, v)| (code, round_score(v)))
            .collect())
    }
}
