//! What-if scenario engine.
//!
//! Pure computation over data already loaded from a published snapshot.
//! Simulation never touches the filesystem, never mutates baseline
//! data, and never persists results: the same request against the same
//! snapshot always produces the same response.
//!
//! Adjustments are relative shifts applied per axis:
//! `simulated = clamp_01(baseline * (1 + shift))`, with each shift
//! bounded to the methodology's supported range. The simulated
//! composite is the unweighted mean over all six axes, fixed by the
//! scenario contract; classification goes through the methodology's
//! thresholds like everywhere else.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::artifact::SummaryRow;
use crate::axis::Axis;
use crate::constants::{MAX_ADJUSTMENT, SCENARIO_VERSION};
use crate::error::ScenarioError;
use crate::hashing::round_score;
use crate::methodology::Methodology;

/// Clamps into `[0, 1]`; non-finite input clamps to `0.0`.
#[must_use]
pub fn clamp_01(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// A validated scenario request.
///
/// Construction is the validation boundary: an existing request always
/// carries a canonical uppercase country code and finite, in-range
/// shifts keyed by axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRequest {
    country: String,
    adjustments: BTreeMap<Axis, f64>,
}

impl ScenarioRequest {
    /// Validates raw request input: a 2-letter country code and
    /// slug-keyed relative shifts.
    ///
    /// Unknown slugs are rejected rather than ignored; axes absent from
    /// the map default to a zero shift. Whether the country exists in
    /// the baseline is checked at simulation time, against the data.
    ///
    /// # Errors
    /// Returns the specific [`ScenarioError`] for a malformed code, an
    /// unknown slug, or a non-finite or out-of-range shift.
    pub fn new(
        country: &str,
        adjustments: &BTreeMap<String, f64>,
    ) -> Result<Self, ScenarioError> {
        let code = country.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ScenarioError::InvalidCountryCode {
                code: country.to_string(),
            });
        }

        let mut validated = BTreeMap::new();
        for (slug, shift) in adjustments {
            let axis = Axis::from_slug(slug).ok_or_else(|| ScenarioError::UnknownAxisSlug {
                slug: slug.clone(),
            })?;
            if !shift.is_finite() {
                return Err(ScenarioError::AdjustmentNotFinite { axis });
            }
            if shift.abs() > MAX_ADJUSTMENT {
                return Err(ScenarioError::AdjustmentOutOfRange {
                    axis,
                    value: *shift,
                    bound: MAX_ADJUSTMENT,
                });
            }
            validated.insert(axis, *shift);
        }

        Ok(Self {
            country: code,
            adjustments: validated,
        })
    }

    /// Canonical country code.
    #[must_use]
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Validated shifts by axis.
    #[must_use]
    pub fn adjustments(&self) -> &BTreeMap<Axis, f64> {
        &self.adjustments
    }
}

/// One side of a scenario comparison, baseline or simulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSide {
    /// Axis scores keyed by slug.
    pub axis_scores: BTreeMap<String, f64>,
    /// Composite under the snapshot's methodology.
    pub composite: f64,
    /// Classification of the composite.
    pub classification: String,
    /// 1-based rank among the 27 countries, descending by composite.
    pub rank: usize,
}

/// Differences between the simulated and baseline sides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioDelta {
    /// Simulated minus baseline composite.
    pub composite: f64,
    /// Per-axis score deltas, keyed by slug, for all six axes.
    pub axis_scores: BTreeMap<String, f64>,
    /// Baseline rank minus simulated rank (positive means the country
    /// moved up, toward rank 1).
    pub rank_change: i64,
}

/// Full scenario response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    /// Scenario contract version tag, always [`SCENARIO_VERSION`].
    pub scenario_version: &'static str,
    /// Country the scenario was run for.
    pub country: String,
    /// Methodology version the baseline was computed under.
    pub methodology_version: String,
    /// Baseline state from the snapshot.
    pub baseline: ScenarioSide,
    /// Simulated state after applying the shifts.
    pub simulated: ScenarioSide,
    /// Simulated minus baseline.
    pub delta: ScenarioDelta,
}

/// Runs one scenario against baseline summary rows from a snapshot.
///
/// Only the target country's scores change; every other country keeps
/// its baseline composite for the rank comparison. All derived floats
/// are rounded once before they appear in the result.
///
/// # Errors
/// Returns [`ScenarioError::CountryNotInBaseline`] when the requested
/// country has no baseline row, and
/// [`ScenarioError::MalformedBaseline`] when its row is missing an axis
/// score or a composite.
pub fn simulate(
    request: &ScenarioRequest,
    baselines: &[SummaryRow],
    methodology: &Methodology,
) -> Result<ScenarioResult, ScenarioError> {
    let code = request.country();
    let row = baselines
        .iter()
        .find(|r| r.country == code)
        .ok_or_else(|| ScenarioError::CountryNotInBaseline {
            code: code.to_string(),
        })?;

    let mut baseline_scores: BTreeMap<Axis, f64> = BTreeMap::new();
    for axis in Axis::ALL {
        let score = row.axis_score(axis).filter(|s| s.is_finite()).ok_or_else(|| {
            ScenarioError::MalformedBaseline {
                code: code.to_string(),
                key: axis.summary_key().to_string(),
            }
        })?;
        baseline_scores.insert(axis, score);
    }
    let baseline_composite = row
        .isi_composite
        .filter(|c| c.is_finite())
        .ok_or_else(|| ScenarioError::MalformedBaseline {
            code: code.to_string(),
            key: "isi_composite".to_string(),
        })?;

    let mut simulated_scores: BTreeMap<Axis, f64> = BTreeMap::new();
    for (axis, baseline) in &baseline_scores {
        let shift = request.adjustments().get(axis).copied().unwrap_or(0.0);
        let simulated = clamp_01(baseline * (1.0 + shift));
        simulated_scores.insert(*axis, round_score(simulated));
    }

    // Clamped again for float safety, although a mean of clamped
    // values cannot leave [0, 1].
    let simulated_composite = round_score(clamp_01(mean(simulated_scores.values())));

    let baseline_rank = rank_of(code, baseline_composite, baselines);
    let simulated_rank = rank_of(code, simulated_composite, baselines);

    let to_slug_map = |scores: &BTreeMap<Axis, f64>| {
        scores
            .iter()
            .map(|(axis, v)| (axis.slug().to_string(), *v))
            .collect::<BTreeMap<String, f64>>()
    };

    let axis_deltas = Axis::ALL
        .iter()
        .map(|axis| {
            let delta = simulated_scores[axis] - baseline_scores[axis];
            (axis.slug().to_string(), round_score(delta))
        })
        .collect();

    Ok(ScenarioResult {
        scenario_version: SCENARIO_VERSION,
        country: code.to_string(),
        methodology_version: methodology.methodology_version.clone(),
        baseline: ScenarioSide {
            axis_scores: to_slug_map(&baseline_scores),
            composite: baseline_composite,
            classification: methodology.classify(baseline_composite).to_string(),
            rank: baseline_rank,
        },
        simulated: ScenarioSide {
            axis_scores: to_slug_map(&simulated_scores),
            composite: simulated_composite,
            classification: methodology.classify(simulated_composite).to_string(),
            rank: simulated_rank,
        },
        delta: ScenarioDelta {
            composite: round_score(simulated_composite - baseline_composite),
            axis_scores: axis_deltas,
            rank_change: baseline_rank as i64 - simulated_rank as i64,
        },
    })
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    sum / count as f64
}

/// 1-based rank of `code` with composite `composite`, with every other
/// country at its baseline composite. Descending by composite,
/// alphabetical tie-break.
fn rank_of(code: &str, composite: f64, baselines: &[SummaryRow]) -> usize {
    let mut table: Vec<(&str, f64)> = baselines
        .iter()
        .filter(|r| r.country != code)
        .filter_map(|r| r.isi_composite.map(|c| (r.country.as_str(), c)))
        .collect();
    table.push((code, composite));
    table.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    table
        .iter()
        .position(|(c, _)| *c == code)
        .map_or(usize::MAX, |i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methodology::test_support::methodology_v1;

    fn row(code: &str, scores: [f64; 6]) -> SummaryRow {
        let mut r = SummaryRow::empty(code, code);
        for (axis, score) in Axis::ALL.iter().zip(scores) {
            r.set_axis_score(*axis, score);
        }
        let composite = round_score(scores.iter().sum::<f64>() / 6.0);
        r.isi_composite = Some(composite);
        r.classification = Some("unconcentrated".to_string());
        r.complete = true;
        r
    }

    fn baseline() -> Vec<SummaryRow> {
        vec![
            row("SE", [0.15, 0.10, 0.25, 0.30, 0.20, 0.18]),
            row("FI", [0.40, 0.40, 0.40, 0.40, 0.40, 0.40]),
            row("DK", [0.05, 0.05, 0.05, 0.05, 0.05, 0.05]),
        ]
    }

    fn shifts(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    #[test]
    fn request_rejects_bad_country_codes() {
        for code in ["", "S", "SWE", "S1", "s-"] {
            assert!(matches!(
                ScenarioRequest::new(code, &BTreeMap::new()),
                Err(ScenarioError::InvalidCountryCode { .. })
            ));
        }
        // Lowercase input is canonicalized, not rejected.
        let req = ScenarioRequest::new(" se ", &BTreeMap::new()).unwrap();
        assert_eq!(req.country(), "SE");
    }

    #[test]
    fn request_rejects_unknown_slug_and_bad_shifts() {
        assert!(matches!(
            ScenarioRequest::new("SE", &shifts(&[("cyber", 0.1)])),
            Err(ScenarioError::UnknownAxisSlug { .. })
        ));
        assert!(matches!(
            ScenarioRequest::new("SE", &shifts(&[("defense", f64::NAN)])),
            Err(ScenarioError::AdjustmentNotFinite { .. })
        ));
        assert!(matches!(
            ScenarioRequest::new("SE", &shifts(&[("defense", 0.21)])),
            Err(ScenarioError::AdjustmentOutOfRange { .. })
        ));
        assert!(matches!(
            ScenarioRequest::new("SE", &shifts(&[("defense", -0.21)])),
            Err(ScenarioError::AdjustmentOutOfRange { .. })
        ));
        // Exactly at the bound is allowed.
        assert!(ScenarioRequest::new("SE", &shifts(&[("defense", 0.20)])).is_ok());
        assert!(ScenarioRequest::new("SE", &shifts(&[("defense", -0.20)])).is_ok());
    }

    #[test]
    fn identity_scenario_reproduces_baseline() {
        let m = methodology_v1(vec![2024], 2024);
        let req = ScenarioRequest::new("SE", &BTreeMap::new()).unwrap();
        let result = simulate(&req, &baseline(), &m).unwrap();
        assert_eq!(result.scenario_version, "scenario-v1");
        assert_eq!(result.baseline.composite, result.simulated.composite);
        assert_eq!(result.baseline.rank, result.simulated.rank);
        assert_eq!(result.delta.composite, 0.0);
        assert_eq!(result.delta.rank_change, 0);
        assert!(result.delta.axis_scores.values().all(|d| *d == 0.0));
    }

    #[test]
    fn defense_shift_matches_hand_computation() {
        let m = methodology_v1(vec![2024], 2024);
        let req = ScenarioRequest::new("SE", &shifts(&[("defense", 0.10)])).unwrap();
        let result = simulate(&req, &baseline(), &m).unwrap();

        // 0.30 * 1.10 = 0.33; composite (0.15+0.10+0.25+0.33+0.20+0.18)/6.
        assert_eq!(result.baseline.composite, 0.19666667);
        assert_eq!(result.simulated.axis_scores["defense"], 0.33);
        assert_eq!(result.simulated.composite, 0.20166667);
        assert_eq!(result.delta.composite, 0.005);
        assert_eq!(result.delta.axis_scores["defense"], 0.03);
        // Classification crosses the 0.15 threshold on both sides.
        assert_eq!(result.baseline.classification, "moderately_concentrated");
        assert_eq!(result.simulated.classification, "moderately_concentrated");
    }

    #[test]
    fn simulated_scores_stay_in_unit_interval() {
        let m = methodology_v1(vec![2024], 2024);
        let table = vec![row("SE", [1.0, 1.0, 1.0, 1.0, 1.0, 1.0])];
        let req = ScenarioRequest::new("SE", &shifts(&[("defense", 0.20)])).unwrap();
        let result = simulate(&req, &table, &m).unwrap();
        // 1.0 * 1.2 clamps back to 1.0.
        assert_eq!(result.simulated.axis_scores["defense"], 1.0);
        assert!(result.simulated.composite <= 1.0);
    }

    #[test]
    fn rank_moves_when_shift_crosses_a_neighbor() {
        let m = methodology_v1(vec![2024], 2024);
        let table = vec![
            row("SE", [0.20, 0.20, 0.20, 0.20, 0.20, 0.20]),
            row("FI", [0.21, 0.21, 0.21, 0.21, 0.21, 0.21]),
        ];
        // Push every SE axis up 10%: composite 0.22 > FI's 0.21.
        let all_up: BTreeMap<String, f64> = Axis::ALL
            .iter()
            .map(|a| (a.slug().to_string(), 0.10))
            .collect();
        let req = ScenarioRequest::new("SE", &all_up).unwrap();
        let result = simulate(&req, &table, &m).unwrap();
        assert_eq!(result.baseline.rank, 2);
        assert_eq!(result.simulated.rank, 1);
        assert_eq!(result.delta.rank_change, 1);
    }

    #[test]
    fn missing_country_and_malformed_rows_error() {
        let m = methodology_v1(vec![2024], 2024);
        let req = ScenarioRequest::new("MT", &BTreeMap::new()).unwrap();
        assert_eq!(
            simulate(&req, &baseline(), &m).unwrap_err(),
            ScenarioError::CountryNotInBaseline {
                code: "MT".to_string()
            }
        );

        let mut broken = baseline();
        broken[0].axis_4_defense = None;
        let req = ScenarioRequest::new("SE", &BTreeMap::new()).unwrap();
        assert!(matches!(
            simulate(&req, &broken, &m).unwrap_err(),
            ScenarioError::MalformedBaseline { .. }
        ));
    }

    #[test]
    fn simulation_does_not_mutate_baseline() {
        let m = methodology_v1(vec![2024], 2024);
        let table = baseline();
        let before = table.clone();
        let req = ScenarioRequest::new("SE", &shifts(&[("energy", -0.20)])).unwrap();
        simulate(&req, &table, &m).unwrap();
        assert_eq!(table, before);
    }
}
