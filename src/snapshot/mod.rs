//! Snapshot lifecycle: materialization, integrity validation,
//! resolution, and read caching.
//!
//! A snapshot is the canonical unit of published data: the complete
//! output of one methodology version applied to one year, written
//! atomically, hash-verified, and frozen thereafter. Directory layout
//! under the snapshot root is `{methodology}/{year}/` with `isi.json`,
//! `country/{CODE}.json` for each of the 27 countries, `axis/{N}.json`
//! for axes 1..=6, `MANIFEST.json`, and `HASH_SUMMARY.json`.

pub mod cache;
pub mod integrity;
pub mod materialize;
pub mod resolver;

pub use cache::{SnapshotCache, DEFAULT_MAX_SNAPSHOTS};
pub use integrity::{validate_snapshot, CheckCategory, IntegrityReport};
pub use materialize::{cleanup_partial_snapshots, data_window_for, Materializer};
pub use resolver::{SnapshotHandle, SnapshotResolver};
