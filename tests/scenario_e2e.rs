//! Scenario engine properties over realistic baseline tables.

use std::collections::BTreeMap;

use isidex::scenario::{simulate, ScenarioRequest};
use isidex::{
    country_hash, round_score, AggregationRule, Axis, Methodology, ScenarioError, SummaryRow,
    EU27_CODES,
};

fn methodology() -> Methodology {
    let mut weights = BTreeMap::new();
    for axis in Axis::ALL {
        weights.insert(axis.slug().to_string(), 1.0);
    }
    Methodology {
        methodology_version: "v1.0".to_string(),
        label: "ISI v1.0 (frozen)".to_string(),
        frozen_at: "2025-01-15T00:00:00+00:00".to_string(),
        latest_year: 2024,
        years_available: vec![2024],
        aggregation_rule: AggregationRule::UnweightedMean,
        aggregation_formula: "ISI_i = (A1_i + A2_i + A3_i + A4_i + A5_i + A6_i) / 6".to_string(),
        axis_count: 6,
        axis_slugs: Axis::ALL.iter().map(|a| a.slug().to_string()).collect(),
        axis_weights: weights,
        classification_thresholds: vec![
            (0.25, "highly_concentrated".to_string()),
            (0.15, "moderately_concentrated".to_string()),
            (0.10, "mildly_concentrated".to_string()),
        ],
        default_classification: "unconcentrated".to_string(),
        score_range: (0.0, 1.0),
        round_precision: 8,
    }
}

fn row(code: &str, scores: [f64; 6]) -> SummaryRow {
    let mut r = SummaryRow::empty(code, code);
    for (axis, score) in Axis::ALL.iter().zip(scores) {
        r.set_axis_score(*axis, score);
    }
    r.isi_composite = Some(round_score(scores.iter().sum::<f64>() / 6.0));
    r.classification = Some("unconcentrated".to_string());
    r.complete = true;
    r
}

/// Full 27-country table with distinct, deterministic composites.
fn full_baseline() -> Vec<SummaryRow> {
    EU27_CODES
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let base = i as f64 * 0.01;
            row(
                code,
                [
                    base + 0.02,
                    base + 0.04,
                    base + 0.06,
                    base + 0.08,
                    base + 0.10,
                    base + 0.12,
                ],
            )
        })
        .collect()
}

fn shifts(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
}

#[test]
fn reference_example_matches_hand_computation() {
    let m = methodology();
    let mut table = full_baseline();
    table[0] = row("AT", [0.15, 0.10, 0.25, 0.30, 0.20, 0.18]);

    let req = ScenarioRequest::new("AT", &shifts(&[("defense", 0.10)])).unwrap();
    let result = simulate(&req, &table, &m).unwrap();

    assert_eq!(result.baseline.composite, 0.19666667);
    assert_eq!(result.simulated.axis_scores["defense"], 0.33);
    assert_eq!(result.simulated.composite, 0.20166667);
    assert_eq!(result.delta.composite, 0.005);
    assert_eq!(result.baseline.classification, "moderately_concentrated");
}

#[test]
fn identity_request_is_a_noop_for_every_country() {
    let m = methodology();
    let table = full_baseline();
    for code in EU27_CODES {
        let req = ScenarioRequest::new(code, &BTreeMap::new()).unwrap();
        let result = simulate(&req, &table, &m).unwrap();
        assert_eq!(result.baseline.composite, result.simulated.composite, "{code}");
        assert_eq!(result.baseline.rank, result.simulated.rank, "{code}");
        assert_eq!(result.delta.rank_change, 0, "{code}");
    }
}

#[test]
fn results_stay_bounded_across_the_full_shift_range() {
    let m = methodology();
    let table = full_baseline();
    // Sweep every axis across the permitted shift range.
    for axis in Axis::ALL {
        for step in -4i32..=4 {
            let shift = f64::from(step) * 0.05;
            let req = ScenarioRequest::new("SE", &shifts(&[(axis.slug(), shift)])).unwrap();
            let result = simulate(&req, &table, &m).unwrap();
            for (slug, score) in &result.simulated.axis_scores {
                assert!((0.0..=1.0).contains(score), "{slug}={score} at shift {shift}");
            }
            assert!((0.0..=1.0).contains(&result.simulated.composite));
            assert!((1..=27).contains(&result.simulated.rank));
        }
    }
}

#[test]
fn positive_shift_never_lowers_the_composite() {
    let m = methodology();
    let table = full_baseline();
    let mut last = 0.0;
    for step in 0..=4 {
        let shift = f64::from(step) * 0.05;
        let req = ScenarioRequest::new("FR", &shifts(&[("energy", shift)])).unwrap();
        let result = simulate(&req, &table, &m).unwrap();
        assert!(
            result.simulated.composite >= last,
            "composite decreased at shift {shift}"
        );
        last = result.simulated.composite;
    }
}

#[test]
fn other_countries_keep_their_baseline_for_ranking() {
    let m = methodology();
    let table = full_baseline();
    // The top country (SK, highest seed) pushed down by 20% everywhere.
    let all_down: BTreeMap<String, f64> = Axis::ALL
        .iter()
        .map(|a| (a.slug().to_string(), -0.20))
        .collect();
    let req = ScenarioRequest::new("SK", &all_down).unwrap();
    let result = simulate(&req, &table, &m).unwrap();
    assert_eq!(result.baseline.rank, 1);
    assert!(result.simulated.rank > 1);
    assert!(result.delta.rank_change < 0);
}

#[test]
fn repeated_simulation_is_deterministic() {
    let m = methodology();
    let table = full_baseline();
    let req = ScenarioRequest::new("DE", &shifts(&[("technology", 0.15), ("energy", -0.10)]))
        .unwrap();
    let a = simulate(&req, &table, &m).unwrap();
    let b = simulate(&req, &table, &m).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unknown_country_is_reported_not_panicked() {
    let m = methodology();
    let req = ScenarioRequest::new("XX", &BTreeMap::new()).unwrap();
    assert_eq!(
        simulate(&req, &full_baseline(), &m).unwrap_err(),
        ScenarioError::CountryNotInBaseline {
            code: "XX".to_string()
        }
    );
}

#[test]
fn country_hash_ignores_map_insertion_order() {
    let m = methodology();
    let forward: BTreeMap<String, f64> = Axis::ALL
        .iter()
        .enumerate()
        .map(|(i, a)| (a.slug().to_string(), 0.10 + i as f64 * 0.02))
        .collect();
    let reversed: BTreeMap<String, f64> = Axis::ALL
        .iter()
        .rev()
        .enumerate()
        .map(|(i, a)| (a.slug().to_string(), 0.10 + (5 - i) as f64 * 0.02))
        .collect();

    let a = country_hash("SE", 2024, &forward, 0.15, "2022\u{2013}2024", &m);
    let b = country_hash("SE", 2024, &reversed, 0.15, "2022\u{2013}2024", &m);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
}
