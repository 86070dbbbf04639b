//! Property snapshots and up-to-date checking for units of work.
//!
//! This crate decides whether a build task has to run again. Every task
//! declares its input and output file properties; after each successful run
//! the files behind them are recorded as snapshots of normalized identities
//! and content digests. Before the next run the current snapshots are
//! compared against the recorded ones and the task is either up to date,
//! skipped or must execute, with the reasons why.
//!
//! # Features
//!
//! - Path normalization (absolute, relative, name only, content only)
//! - Unordered and ordered snapshot comparison with per-file deltas
//! - Collision detection when normalization maps distinct files together
//! - Skip-when-empty inputs, optional properties, implementation changes
//! - Keyed snapshot store shared by concurrently evaluated units
//! - Stable fingerprints for cache keys
//!
//! # Example
//!
//! ```
//! use convenient_snapshot::{
//!     CurrentSnapshots, ExecutionOutcome, FileDigest, FileSource, InMemorySnapshotStore,
//!     NormalizationStrategy, NormalizedEntry, PropertyRole, PropertySet, PropertySpec,
//!     Snapshot, UnitOfWork, UpToDateEngine,
//! };
//!
//! let sources = PropertySpec::input("compile", false, FileSource::collection(["src"]))
//!     .with_property_name("sources")
//!     .with_snapshot_normalization_strategy(NormalizationStrategy::Relative)
//!     .build()
//!     .unwrap();
//! let unit = UnitOfWork::new(PropertySet::from_specs("compile", [sources]).unwrap());
//!
//! let snapshot = Snapshot::new(
//!     NormalizationStrategy::Relative,
//!     vec![NormalizedEntry::new("main.c", FileDigest::of(b"int main() {}"))],
//! );
//! let current = CurrentSnapshots::new().with_snapshot(PropertyRole::Input, "sources", snapshot);
//!
//! let store = InMemorySnapshotStore::new();
//! let engine = UpToDateEngine::default();
//!
//! // First run: nothing recorded yet
//! assert!(engine.decide_with_store(&store, &unit, &current).unwrap().must_execute());
//! engine.complete(&store, &unit, ExecutionOutcome::Executed, &current).unwrap();
//!
//! // Nothing changed since
//! assert!(engine.decide_with_store(&store, &unit, &current).unwrap().is_up_to_date());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod compare;
pub mod config;
pub mod decision;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod normalization;
pub mod property;
pub mod snapshot;
pub mod state;
pub mod store;

pub use compare::{ChangeResult, ChangeStatus, CompareStrategy, DeltaKind, EntryDelta};
pub use config::EngineConfig;
pub use decision::{Decision, DecisionStats, ExecutionOutcome, ExecutionReason, SkipReason};
pub use detector::ChangeDetector;
pub use engine::{UnitDecision, UnitEvaluation, UnitOfWork, UpToDateEngine};
pub use error::{ConfigError, SnapshotError, SnapshotResult};
pub use fingerprint::fingerprint;
pub use normalization::{NormalizationStrategy, PathSensitivity};
pub use property::{
    FileSource, PropertyRole, PropertySet, PropertySpec, PropertySpecBuilder, SnapshotterKind,
    SourceKind,
};
pub use snapshot::{FileDigest, NormalizedEntry, RawEntry, Snapshot};
pub use state::{CurrentSnapshots, Observation, PropertySnapshots, UnitHistory};
pub use store::{InMemorySnapshotStore, SnapshotStore};
