//! # isidex - Import Dependency Index Snapshot Store
//!
//! isidex materializes, verifies, and serves immutable yearly snapshots
//! of a six-axis strategic import dependency index over the 27 EU
//! member states, plus a pure what-if scenario engine on top of the
//! published data.
//!
//! ## Core Concepts
//!
//! - **Methodology**: A frozen, versioned set of thresholds, weights,
//!   and aggregation rules; the single source of truth for scoring
//! - **Snapshot**: The complete output of one methodology applied to
//!   one year, written atomically and immutable once published
//! - **Computation hash**: A SHA-256 digest over every input that
//!   affects a country's composite, reproducible forever
//! - **Scenario**: A bounded, side-effect-free simulation of axis
//!   shifts against a snapshot baseline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use isidex::{Materializer, MethodologyRegistry, SnapshotResolver};
//!
//! let registry = Arc::new(MethodologyRegistry::load("registry.json")?);
//!
//! // Publish the 2024 snapshot under the latest methodology.
//! let materializer = Materializer::new("snapshots", registry.clone(), provider);
//! materializer.materialize(2024, registry.latest_version(), false)?;
//!
//! // Serve it, with full integrity validation on first access.
//! let resolver = SnapshotResolver::new("snapshots", registry);
//! let handle = resolver.resolve(None, Some(2024))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod artifact;
pub mod axis;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod methodology;
pub mod provider;
pub mod scenario;
pub mod snapshot;

// Re-export primary types at crate root for convenience
pub use artifact::{
    AxisDoc, CountryDoc, HashSummary, Manifest, Statistics, SummaryDoc, SummaryRow,
};
pub use axis::Axis;
pub use constants::{EU27_CODES, MAX_ADJUSTMENT, NUM_AXES, ROUND_PRECISION};
pub use error::{
    CacheError, IsiError, IsiResult, MaterializeError, RegistryError, ScenarioError, ScoreError,
    SnapshotNotFound,
};
pub use hashing::{canonical_float, country_hash, round_score, snapshot_hash};
pub use methodology::{AggregationRule, Methodology, MethodologyRegistry};
pub use provider::{AxisScoreProvider, InMemoryAxisScores, JsonDirScores};
pub use scenario::{simulate, ScenarioRequest, ScenarioResult};
pub use snapshot::{
    cleanup_partial_snapshots, validate_snapshot, IntegrityReport, Materializer, SnapshotCache,
    SnapshotHandle, SnapshotResolver,
};
