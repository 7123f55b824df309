//! Deterministic computation hashing for ISI snapshots.
//!
//! Hash inputs are human-readable text blocks, inspectable for
//! debugging. Contract:
//! - [`canonical_float`] is stable forever for identical rounded input.
//! - [`country_hash`] / [`snapshot_hash`] are deterministic for
//!   logically identical input regardless of map iteration order.
//! - Hash inputs include every value that affects a country's composite
//!   or classification. No hidden parameters, no implicit state.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::constants::ROUND_PRECISION;
use crate::error::RegistryError;
use crate::methodology::{AggregationRule, Methodology};

/// Rounds a value to [`ROUND_PRECISION`] decimal places.
///
/// Applied exactly once, at the point where a derived value (composite,
/// statistic) is finalized — before classification, sorting, hashing, or
/// serialization. Axis scores arrive pre-rounded from their producers.
/// Ties round half-away-from-zero; pre-rounded 8-decimal inputs cannot
/// produce a tie at the 9th decimal from a mean of six terms.
#[must_use]
pub fn round_score(value: f64) -> f64 {
    let scale = 10f64.powi(ROUND_PRECISION as i32);
    (value * scale).round() / scale
}

/// Canonical fixed-point string for a rounded float.
///
/// Exactly [`ROUND_PRECISION`] decimals, no scientific notation, no
/// trimming, no locale sensitivity:
///
/// ```
/// # use isidex::hashing::canonical_float;
/// assert_eq!(canonical_float(0.5), "0.50000000");
/// assert_eq!(canonical_float(0.11646504), "0.11646504");
/// assert_eq!(canonical_float(1.0), "1.00000000");
/// ```
#[must_use]
pub fn canonical_float(value: f64) -> String {
    format!("{value:.prec$}", prec = ROUND_PRECISION as usize)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn aggregation_rule_name(rule: AggregationRule) -> &'static str {
    match rule {
        AggregationRule::UnweightedMean => "unweighted_arithmetic_mean",
        AggregationRule::WeightedMean => "weighted_arithmetic_mean",
    }
}

/// Computes the SHA-256 hash of one country's snapshot computation.
///
/// All float values must already be rounded to [`ROUND_PRECISION`].
/// The input block enumerates, one field per line with a trailing
/// newline: country, year, methodology, data window, each axis score
/// (sorted by slug), composite, aggregation rule, each axis weight
/// (sorted by slug), each threshold (descending) as `value:label`, and
/// the default classification. Every field is present even at default
/// values.
#[must_use]
pub fn country_hash(
    country_code: &str,
    year: i32,
    axis_scores: &BTreeMap<String, f64>,
    composite: f64,
    data_window: &str,
    methodology: &Methodology,
) -> String {
    let mut parts: Vec<String> = vec![
        format!("country={country_code}"),
        format!("year={year}"),
        format!("methodology={}", methodology.methodology_version),
        format!("data_window={data_window}"),
    ];

    // BTreeMap iteration is already in sorted slug order.
    for (slug, score) in axis_scores {
        parts.push(format!("axis.{slug}={}", canonical_float(*score)));
    }

    parts.push(format!("composite={}", canonical_float(composite)));
    parts.push(format!(
        "aggregation_rule={}",
        aggregation_rule_name(methodology.aggregation_rule)
    ));

    for slug in axis_scores.keys() {
        let weight = methodology.axis_weights.get(slug).copied().unwrap_or(1.0);
        parts.push(format!("weight.{slug}={}", canonical_float(weight)));
    }

    // Thresholds are validated descending at registry load.
    for (value, label) in &methodology.classification_thresholds {
        parts.push(format!("threshold={}:{label}", canonical_float(*value)));
    }

    parts.push(format!(
        "default_classification={}",
        methodology.default_classification
    ));

    let mut input = parts.join("\n");
    input.push('\n');
    sha256_hex(&input)
}

/// Computes the snapshot-level hash from all per-country hashes.
///
/// SHA-256 over alphabetically sorted `{country}={hash}` lines with a
/// trailing newline.
///
/// # Errors
/// Returns [`RegistryError::Invalid`] if the map is empty.
pub fn snapshot_hash(country_hashes: &BTreeMap<String, String>) -> Result<String, RegistryError> {
    if country_hashes.is_empty() {
        return Err(RegistryError::Invalid {
            reason: "country_hashes is empty".to_string(),
        });
    }

    let mut input = country_hashes
        .iter()
        .map(|(code, hash)| format!("{code}={hash}"))
        .collect::<Vec<_>>()
        .join("\n");
    input.push('\n');
    Ok(sha256_hex(&input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methodology::test_support::methodology_v1;

    fn scores(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values
            .iter()
            .map(|(slug, v)| (slug.to_string(), *v))
            .collect()
    }

    #[test]
    fn canonical_float_fixed_point() {
        assert_eq!(canonical_float(0.0), "0.00000000");
        assert_eq!(canonical_float(0.5), "0.50000000");
        assert_eq!(canonical_float(1.0), "1.00000000");
        assert_eq!(canonical_float(0.11646504), "0.11646504");
        // No scientific notation even for tiny values.
        assert_eq!(canonical_float(0.00000001), "0.00000001");
    }

    #[test]
    fn round_score_eight_decimals() {
        assert_eq!(round_score(0.123456789), 0.12345679);
        assert_eq!(round_score(0.1), 0.1);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn country_hash_is_64_hex_chars() {
        let m = methodology_v1(vec![2024], 2024);
        let s = scores(&[
            ("critical_inputs", 0.20),
            ("defense", 0.30),
            ("energy", 0.10),
            ("financial", 0.15),
            ("logistics", 0.18),
            ("technology", 0.25),
        ]);
        let h = country_hash("SE", 2024, &s, 0.19666667, "2022\u{2013}2024", &m);
        assert_eq!(h.len(), 64);
        assert!(hex::decode(&h).is_ok());
    }

    #[test]
    fn country_hash_independent_of_insertion_order() {
        let m = methodology_v1(vec![2024], 2024);
        let forward = scores(&[
            ("financial", 0.15),
            ("energy", 0.10),
            ("technology", 0.25),
            ("defense", 0.30),
            ("critical_inputs", 0.20),
            ("logistics", 0.18),
        ]);
        let reversed = scores(&[
            ("logistics", 0.18),
            ("critical_inputs", 0.20),
            ("defense", 0.30),
            ("technology", 0.25),
            ("energy", 0.10),
            ("financial", 0.15),
        ]);
        let a = country_hash("SE", 2024, &forward, 0.19666667, "2022\u{2013}2024", &m);
        let b = country_hash("SE", 2024, &reversed, 0.19666667, "2022\u{2013}2024", &m);
        assert_eq!(a, b);
    }

    #[test]
    fn country_hash_sensitive_to_every_field() {
        let m = methodology_v1(vec![2024], 2024);
        let s = scores(&[("financial", 0.15), ("energy", 0.10)]);
        let base = country_hash("SE", 2024, &s, 0.125, "2022\u{2013}2024", &m);

        assert_ne!(base, country_hash("FI", 2024, &s, 0.125, "2022\u{2013}2024", &m));
        assert_ne!(base, country_hash("SE", 2023, &s, 0.125, "2022\u{2013}2024", &m));
        assert_ne!(base, country_hash("SE", 2024, &s, 0.126, "2022\u{2013}2024", &m));
        assert_ne!(base, country_hash("SE", 2024, &s, 0.125, "2021\u{2013}2023", &m));

        let mut other = methodology_v1(vec![2024], 2024);
        other.default_classification = "low".to_string();
        assert_ne!(base, country_hash("SE", 2024, &s, 0.125, "2022\u{2013}2024", &other));
    }

    #[test]
    fn snapshot_hash_rejects_empty_map() {
        assert!(snapshot_hash(&BTreeMap::new()).is_err());
    }

    #[test]
    fn snapshot_hash_known_vector() {
        // SHA-256 of "AT=aaaa\nSE=bbbb\n" — fixed forever.
        let mut hashes = BTreeMap::new();
        hashes.insert("SE".to_string(), "bbbb".to_string());
        hashes.insert("AT".to_string(), "aaaa".to_string());
        let h = snapshot_hash(&hashes).unwrap();
        assert_eq!(h, sha256_hex("AT=aaaa\nSE=bbbb\n"));
    }
}
