//! Methodology registry: the single source of truth for classification
//! thresholds, axis weights, and composite aggregation.
//!
//! [`Methodology::classify`] is the only classification function in the
//! crate and [`Methodology::composite`] the only composite computation.
//! The exporter, the validator, and the scenario engine all go through
//! them; no hardcoded thresholds elsewhere.
//!
//! The registry is loaded once at process start, validated, and then
//! immutable. Components receive it by `Arc` — no module-level globals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::error::RegistryError;

/// Composite aggregation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationRule {
    /// Plain arithmetic mean over all axes.
    #[serde(rename = "unweighted_arithmetic_mean")]
    UnweightedMean,
    /// Weighted arithmetic mean using the methodology's axis weights.
    #[serde(rename = "weighted_arithmetic_mean")]
    WeightedMean,
}

/// One frozen methodology version from the registry.
///
/// All fields are read-only after load; a change to any of them requires
/// registering a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Methodology {
    /// Version string, e.g. "v1.0".
    pub methodology_version: String,
    /// Human-readable label.
    pub label: String,
    /// ISO timestamp at which this version was frozen.
    pub frozen_at: String,
    /// Most recent year with a materialized snapshot.
    pub latest_year: i32,
    /// Years for which snapshots may be materialized.
    pub years_available: Vec<i32>,
    /// Composite aggregation rule.
    pub aggregation_rule: AggregationRule,
    /// Display form of the aggregation formula.
    pub aggregation_formula: String,
    /// Number of axes (must equal `axis_slugs.len()`).
    pub axis_count: usize,
    /// Axis slugs covered by this methodology.
    pub axis_slugs: Vec<String>,
    /// Weight per axis slug (used by the weighted rule).
    pub axis_weights: BTreeMap<String, f64>,
    /// Classification thresholds, descending by value.
    pub classification_thresholds: Vec<(f64, String)>,
    /// Label applied below every threshold.
    pub default_classification: String,
    /// Valid score range, always `[0.0, 1.0]`.
    pub score_range: (f64, f64),
    /// Decimal precision all stored floats are rounded to.
    pub round_precision: u32,
}

impl Methodology {
    /// Classifies a score against this methodology's thresholds.
    ///
    /// This is the ONLY classification function in the crate.
    #[must_use]
    pub fn classify(&self, score: f64) -> &str {
        for (threshold, label) in &self.classification_thresholds {
            if score >= *threshold {
                return label;
            }
        }
        &self.default_classification
    }

    /// Computes the composite for one country under this methodology's
    /// aggregation rule. The result is NOT rounded; callers round once
    /// via [`crate::hashing::round_score`].
    ///
    /// # Errors
    /// Returns [`RegistryError::Invalid`] for empty input or a zero
    /// total weight under the weighted rule.
    pub fn composite(&self, axis_scores: &BTreeMap<Axis, f64>) -> Result<f64, RegistryError> {
        if axis_scores.is_empty() {
            return Err(RegistryError::Invalid {
                reason: "composite requires at least one axis score".to_string(),
            });
        }

        match self.aggregation_rule {
            AggregationRule::UnweightedMean => {
                let sum: f64 = axis_scores.values().sum();
                Ok(sum / axis_scores.len() as f64)
            }
            AggregationRule::WeightedMean => {
                let mut weighted_sum = 0.0;
                let mut total_weight = 0.0;
                for (axis, score) in axis_scores {
                    let w = self.axis_weights.get(axis.slug()).copied().unwrap_or(1.0);
                    weighted_sum += score * w;
                    total_weight += w;
                }
                if total_weight == 0.0 {
                    return Err(RegistryError::Invalid {
                        reason: "total axis weight is zero".to_string(),
                    });
                }
                Ok(weighted_sum / total_weight)
            }
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let v = &self.methodology_version;
        let invalid = |reason: String| RegistryError::Invalid { reason };

        if self.axis_count != self.axis_slugs.len() {
            return Err(invalid(format!(
                "methodology '{v}': axis_count ({}) != len(axis_slugs) ({})",
                self.axis_count,
                self.axis_slugs.len()
            )));
        }

        let slug_set: Vec<&str> = self.axis_slugs.iter().map(String::as_str).collect();
        for slug in &slug_set {
            if Axis::from_slug(slug).is_none() {
                return Err(invalid(format!("methodology '{v}': unknown axis slug '{slug}'")));
            }
        }

        let weight_keys: Vec<&str> = self.axis_weights.keys().map(String::as_str).collect();
        let mut sorted_slugs = slug_set.clone();
        sorted_slugs.sort_unstable();
        if weight_keys != sorted_slugs {
            return Err(invalid(format!(
                "methodology '{v}': axis_weights keys do not match axis_slugs"
            )));
        }

        let thresholds: Vec<f64> = self
            .classification_thresholds
            .iter()
            .map(|(t, _)| *t)
            .collect();
        if thresholds.windows(2).any(|w| w[0] <= w[1]) {
            return Err(invalid(format!(
                "methodology '{v}': classification_thresholds not strictly descending"
            )));
        }

        if self.score_range != (0.0, 1.0) {
            return Err(invalid(format!(
                "methodology '{v}': unexpected score_range {:?}",
                self.score_range
            )));
        }

        if self.years_available.is_empty() {
            return Err(invalid(format!("methodology '{v}': years_available is empty")));
        }
        if !self.years_available.contains(&self.latest_year) {
            return Err(invalid(format!(
                "methodology '{v}': latest_year {} not in years_available",
                self.latest_year
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[allow(dead_code)]
    schema_version: u32,
    latest: String,
    methodologies: Vec<Methodology>,
}

/// Validated, immutable methodology registry.
///
/// Constructed once at process start and shared by `Arc`; read-only
/// thereafter.
#[derive(Debug)]
pub struct MethodologyRegistry {
    path: PathBuf,
    latest: String,
    entries: BTreeMap<String, Methodology>,
}

impl MethodologyRegistry {
    /// Loads and validates a registry file.
    ///
    /// # Errors
    /// Fails on missing file, malformed JSON, duplicate versions, a
    /// dangling `latest` pointer, or any invalid methodology entry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(RegistryError::NotFound { path });
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        let file: RegistryFile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.clone(),
                source,
            })?;

        if file.methodologies.is_empty() {
            return Err(RegistryError::Invalid {
                reason: "registry has no methodologies".to_string(),
            });
        }

        let mut entries = BTreeMap::new();
        for entry in file.methodologies {
            entry.validate()?;
            let version = entry.methodology_version.clone();
            if entries.insert(version.clone(), entry).is_some() {
                return Err(RegistryError::Invalid {
                    reason: format!("duplicate methodology version: '{version}'"),
                });
            }
        }

        if !entries.contains_key(&file.latest) {
            return Err(RegistryError::Invalid {
                reason: format!(
                    "registry 'latest' points to '{}' which is not registered",
                    file.latest
                ),
            });
        }

        Ok(Self {
            path,
            latest: file.latest,
            entries,
        })
    }

    /// Path this registry was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up a specific methodology version.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownVersion`] if absent.
    pub fn get(&self, version: &str) -> Result<&Methodology, RegistryError> {
        self.entries
            .get(version)
            .ok_or_else(|| RegistryError::UnknownVersion {
                version: version.to_string(),
            })
    }

    /// Version string of the latest methodology.
    #[must_use]
    pub fn latest_version(&self) -> &str {
        &self.latest
    }

    /// Latest year of the latest methodology.
    #[must_use]
    pub fn latest_year(&self) -> i32 {
        // The latest pointer is validated at load time.
        self.entries[&self.latest].latest_year
    }

    /// Available years for a methodology, ascending.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownVersion`] if absent.
    pub fn years_available(&self, version: &str) -> Result<Vec<i32>, RegistryError> {
        let mut years = self.get(version)?.years_available.clone();
        years.sort_unstable();
        Ok(years)
    }

    /// All registered versions, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
