//! Error types for isidex.
//!
//! All errors are strongly typed using thiserror. Each concern gets its
//! own enum so callers can pattern-match on specific conditions; the
//! top-level [`IsiError`] wraps them for APIs that cross concerns.

use std::path::PathBuf;

use thiserror::Error;

use crate::axis::Axis;

/// Errors raised while loading or validating the methodology registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Methodology registry not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid registry: {reason}")]
    Invalid { reason: String },

    #[error("Unknown methodology version: '{version}'")]
    UnknownVersion { version: String },
}

/// Errors raised by axis-score providers and score validation.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Axis {axis}: score file not found: {path}")]
    FileNotFound { axis: Axis, path: PathBuf },

    #[error("Axis {axis}: failed to read scores: {source}")]
    Io {
        axis: Axis,
        #[source]
        source: std::io::Error,
    },

    #[error("Axis {axis}: failed to parse scores: {source}")]
    Parse {
        axis: Axis,
        #[source]
        source: serde_json::Error,
    },

    #[error("Axis {axis}: score {value} out of [0,1] for {country}")]
    OutOfRange {
        axis: Axis,
        country: String,
        value: f64,
    },

    #[error("Axis {axis}: non-finite score for {country}")]
    NotFinite { axis: Axis, country: String },

    #[error("Axis {axis}: unexpected country '{country}'")]
    UnknownCountry { axis: Axis, country: String },

    #[error("Axis {axis}: missing EU-27 countries: {missing:?}")]
    MissingCountries { axis: Axis, missing: Vec<String> },
}

/// Errors raised during snapshot materialization.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(
        "FREEZE VIOLATION: snapshot {methodology}/{year} already exists at {path}. \
         Historical snapshots are immutable; register a new methodology version \
         to publish revised data, or pass force (development only)"
    )]
    FreezeViolation {
        methodology: String,
        year: i32,
        path: PathBuf,
    },

    #[error("Country {country}: incomplete axis scores ({have}/{need})")]
    IncompleteCountry {
        country: String,
        have: usize,
        need: usize,
    },

    #[error("Self-verification failed: {reason}")]
    Verification { reason: String },

    #[error("I/O error during materialization ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error during materialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Scores(#[from] ScoreError),
}

impl MaterializeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Structured not-found error produced by the resolver.
///
/// A snapshot that fails any integrity check in strict mode surfaces as
/// this same error; a structurally broken snapshot is never served.
#[derive(Debug, Error)]
#[error("Snapshot {methodology}/{year} not found: {detail}")]
pub struct SnapshotNotFound {
    /// Methodology version that was requested (after default resolution).
    pub methodology: String,
    /// Year that was requested (after default resolution).
    pub year: i32,
    /// Human-readable reason.
    pub detail: String,
}

/// Errors raised by the snapshot cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown artifact key: '{artifact}'")]
    UnknownArtifact { artifact: String },

    #[error("Path traversal detected: artifact '{artifact}' resolves outside {snapshot_dir}")]
    PathTraversal {
        artifact: String,
        snapshot_dir: PathBuf,
    },

    #[error("Invalid cache key: {reason}")]
    InvalidKey { reason: String },

    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Structured scenario errors, returned as values so callers can render
/// deterministic messages. Never a panic.
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Invalid country code: '{code}'. Must be 2-letter ISO alpha")]
    InvalidCountryCode { code: String },

    #[error("Unknown axis slug: '{slug}'")]
    UnknownAxisSlug { slug: String },

    #[error("Adjustment for '{axis}' must be finite")]
    AdjustmentNotFinite { axis: Axis },

    #[error("Adjustment for '{axis}' = {value} is out of range [-{bound}, +{bound}]")]
    AdjustmentOutOfRange { axis: Axis, value: f64, bound: f64 },

    #[error("Country '{code}' not found in baseline data")]
    CountryNotInBaseline { code: String },

    #[error("Baseline row for {code} is malformed: missing or non-finite '{key}'")]
    MalformedBaseline { code: String, key: String },
}

/// Top-level error type for isidex operations.
#[derive(Debug, Error)]
pub enum IsiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Scores(#[from] ScoreError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    NotFound(#[from] SnapshotNotFound),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl IsiError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias for isidex operations.
pub type IsiResult<T> = Result<T, IsiError>;
