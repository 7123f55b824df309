//! Global constants for the ISI snapshot store.
//!
//! Single source of truth: every module that needs these values imports
//! them from here. No hardcoded duplicates anywhere in the crate.

/// Decimal places for every float that enters storage, classification,
/// sorting, or hashing.
///
/// Rounding happens once, at the earliest point where a value is
/// finalized. No double-rounding: values are rounded before
/// classification, before sorting, before hashing, before serialization.
pub const ROUND_PRECISION: u32 = 8;

/// Number of ISI axes. Changing this requires a new methodology version.
pub const NUM_AXES: usize = 6;

/// Scenario adjustment bound: shifts live in `[-MAX_ADJUSTMENT, +MAX_ADJUSTMENT]`.
pub const MAX_ADJUSTMENT: f64 = 0.20;

/// Wire-format version tag for scenario results.
pub const SCENARIO_VERSION: &str = "scenario-v1";

/// The EU-27 country codes, frozen, in alphabetical order.
pub const EU27_CODES: [&str; 27] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "EL", "ES", "FI", "FR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Returns true if `code` is one of the 27 canonical country codes.
#[must_use]
pub fn is_eu27(code: &str) -> bool {
    EU27_CODES.binary_search(&code).is_ok()
}

/// English short name for a country code. Falls back to the code itself
/// for unknown input so display paths never fail.
#[must_use]
pub fn country_name(code: &str) -> &str {
    match code {
        "AT" => "Austria",
        "BE" => "Belgium",
        "BG" => "Bulgaria",
        "CY" => "Cyprus",
        "CZ" => "Czechia",
        "DE" => "Germany",
        "DK" => "Denmark",
        "EE" => "Estonia",
        "EL" => "Greece",
        "ES" => "Spain",
        "FI" => "Finland",
        "FR" => "France",
        "HR" => "Croatia",
        "HU" => "Hungary",
        "IE" => "Ireland",
        "IT" => "Italy",
        "LT" => "Lithuania",
        "LU" => "Luxembourg",
        "LV" => "Latvia",
        "MT" => "Malta",
        "NL" => "Netherlands",
        "PL" => "Poland",
        "PT" => "Portugal",
        "RO" => "Romania",
        "SE" => "Sweden",
        "SI" => "Slovenia",
        "SK" => "Slovakia",
        other => other,
    }
}
