//! Up-to-date decision engine
//!
//! Aggregates per-property change detection into a single decision for a
//! unit of work. Checks run in a fixed order so the first reason reported
//! is always the first one that applies:
//!
//! 1. No recorded history: the unit must run.
//! 2. An input flagged `skip_when_empty` is empty: the unit is skipped,
//!    whatever else changed.
//! 3. Implementation and every declared property (inputs, then outputs, in
//!    declaration order) are compared against the history; all reasons
//!    are collected.
//! 4. No reasons: the unit is up to date.
//!
//! Anything uncertain resolves toward running the unit. Only invalid
//! configuration aborts with an error.

use crate::compare::ChangeResult;
use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionStats, ExecutionOutcome, ExecutionReason, SkipReason};
use crate::detector::ChangeDetector;
use crate::error::{ConfigError, SnapshotResult};
use crate::property::{PropertyRole, PropertySet, PropertySpec};
use crate::state::{CurrentSnapshots, Observation, UnitHistory};
use crate::store::SnapshotStore;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Cause reported for a property whose snapshot was incomplete when the
/// unit's history was committed
pub const PREVIOUSLY_INCOMPLETE: &str = "snapshot was incomplete on the last committed run";

/// A schedulable unit of work and everything it declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    properties: PropertySet,
    implementation: Option<String>,
}

impl UnitOfWork {
    /// Unit identified by its property set's unit name
    #[must_use]
    pub fn new(properties: PropertySet) -> Self {
        Self {
            properties,
            implementation: None,
        }
    }

    /// Attach a fingerprint of the unit's own action, such as its script hash
    #[must_use]
    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    /// Unit identity
    #[must_use]
    pub fn identity(&self) -> &str {
        self.properties.unit()
    }

    /// Implementation fingerprint
    #[must_use]
    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    /// Declared properties
    #[must_use]
    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }
}

/// One unit to decide in a batch, with what the snapshotter observed for it
#[derive(Debug, Clone)]
pub struct UnitEvaluation {
    /// The unit
    pub unit: UnitOfWork,
    /// Observations of its properties
    pub current: CurrentSnapshots,
}

/// Decision for one unit of a batch
#[derive(Debug)]
pub struct UnitDecision {
    /// Unit identity
    pub unit: String,
    /// Decision, or the error that prevented it
    pub decision: SnapshotResult<Decision>,
}

impl<'a> FromIterator<&'a UnitDecision> for DecisionStats {
    fn from_iter<I: IntoIterator<Item = &'a UnitDecision>>(iter: I) -> Self {
        let mut stats = Self::default();
        for decided in iter {
            match &decided.decision {
                Ok(decision) => stats.record(decision),
                Err(_) => stats.record_error(),
            }
        }
        stats
    }
}

/// Decides whether units of work must run
#[derive(Debug, Clone, Default)]
pub struct UpToDateEngine {
    config: EngineConfig,
    detector: ChangeDetector,
}

impl UpToDateEngine {
    /// Create an engine
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let detector = ChangeDetector::new(&config);
        Self { config, detector }
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether `unit` must run, given its last committed history.
    ///
    /// # Errors
    ///
    /// - `ConfigError::UnresolvedProperty` if a required property could not
    ///   be resolved
    /// - `ConfigError::IncompleteRequiredProperty` if snapshotting a
    ///   required property failed
    /// - `SnapshotError::StrategyMismatch` if a current snapshot was taken
    ///   under a normalization its property does not declare
    #[tracing::instrument(level = "debug", skip_all, fields(unit = %unit.identity()))]
    pub fn decide(
        &self,
        unit: &UnitOfWork,
        history: Option<&UnitHistory>,
        current: &CurrentSnapshots,
    ) -> SnapshotResult<Decision> {
        let decision = self.evaluate(unit, history, current)?;
        match &decision {
            Decision::MustExecute(reasons) => info!(
                "{} must execute: {} ({} reasons)",
                unit.identity(),
                decision,
                reasons.len()
            ),
            _ => info!("{}: {}", unit.identity(), decision),
        }
        Ok(decision)
    }

    fn evaluate(
        &self,
        unit: &UnitOfWork,
        history: Option<&UnitHistory>,
        current: &CurrentSnapshots,
    ) -> SnapshotResult<Decision> {
        let Some(history) = history else {
            return Ok(Decision::MustExecute(vec![ExecutionReason::NoHistory]));
        };

        if let Some(empty) = unit
            .properties()
            .inputs()
            .find(|spec| spec.is_skip_when_empty() && is_empty(spec, current))
        {
            return Ok(Decision::Skip(SkipReason::EmptyInputTriggersSkip {
                property: empty.name().to_string(),
            }));
        }

        let mut reasons = Vec::new();

        if history.implementation.as_deref() != unit.implementation() {
            reasons.push(ExecutionReason::ImplementationChanged {
                previous: history.implementation.clone(),
                current: unit.implementation.clone(),
            });
        }

        for spec in unit.properties().in_evaluation_order() {
            if let Some(reason) = self.property_reason(spec, history, current)? {
                reasons.push(reason);
            }
        }

        for (role, name) in history.properties() {
            if unit.properties().get(role, name).is_none() {
                reasons.push(ExecutionReason::PropertyUndeclared {
                    role,
                    name: name.to_string(),
                });
            }
        }

        if reasons.is_empty() {
            Ok(Decision::UpToDate)
        } else {
            Ok(Decision::MustExecute(reasons))
        }
    }

    fn property_reason(
        &self,
        spec: &PropertySpec,
        history: &UnitHistory,
        current: &CurrentSnapshots,
    ) -> SnapshotResult<Option<ExecutionReason>> {
        let current = match current.get(spec.role(), spec.name()) {
            Observation::Captured(snapshot) => Some(snapshot),
            Observation::Unresolved => None,
            Observation::Incomplete(cause) if spec.is_optional() => {
                warn!("Snapshot of {} is incomplete: {}", spec, cause);
                return Ok(Some(ExecutionReason::IncompleteSnapshot {
                    role: spec.role(),
                    name: spec.name().to_string(),
                    cause: cause.clone(),
                }));
            }
            Observation::Incomplete(cause) => {
                return Err(ConfigError::IncompleteRequiredProperty {
                    unit: spec.unit().to_string(),
                    name: spec.name().to_string(),
                    cause: cause.clone(),
                }
                .into());
            }
        };

        if history.was_incomplete(spec.role(), spec.name()) {
            // Nothing trustworthy was recorded; still validate what was observed now.
            let _ = self.detector.detect(spec, None, current)?;
            debug!("{} was incomplete when {} last ran", spec, spec.unit());
            return Ok(Some(ExecutionReason::IncompleteSnapshot {
                role: spec.role(),
                name: spec.name().to_string(),
                cause: PREVIOUSLY_INCOMPLETE.to_string(),
            }));
        }

        // A recorded snapshot taken under another normalization means the
        // property was reconfigured; it cannot be compared to the current one.
        let previous = history.snapshots.get(spec.role(), spec.name());
        let reconfigured = previous.filter(|p| p.normalization() != spec.normalization());
        let previous = previous.filter(|p| p.normalization() == spec.normalization());

        let mut change = self.detector.detect(spec, previous, current)?;
        if let Some(previous) = reconfigured {
            debug!(
                "{} was recorded with {} normalization, now {}",
                spec.name(),
                previous.normalization(),
                spec.normalization()
            );
            change = ChangeResult::incompatible(Vec::new());
        }

        if change.is_unchanged() {
            return Ok(None);
        }
        Ok(Some(ExecutionReason::PropertyChanged {
            role: spec.role(),
            name: spec.name().to_string(),
            change,
        }))
    }

    /// Load the unit's history from `store` and decide
    ///
    /// # Errors
    ///
    /// Store failures and everything [`UpToDateEngine::decide`] reports.
    pub fn decide_with_store<S>(
        &self,
        store: &S,
        unit: &UnitOfWork,
        current: &CurrentSnapshots,
    ) -> SnapshotResult<Decision>
    where
        S: SnapshotStore + ?Sized,
    {
        let history = store.load(unit.identity())?;
        self.decide(unit, history.as_deref(), current)
    }

    /// Decide a batch of independent units.
    ///
    /// Units share nothing but the store, so they are evaluated in parallel
    /// unless `parallel_units` is off. Results keep the input order.
    pub fn decide_all<S>(&self, store: &S, evaluations: &[UnitEvaluation]) -> Vec<UnitDecision>
    where
        S: SnapshotStore + ?Sized,
    {
        let decide = |evaluation: &UnitEvaluation| UnitDecision {
            unit: evaluation.unit.identity().to_string(),
            decision: self.decide_with_store(store, &evaluation.unit, &evaluation.current),
        };

        debug!("Deciding {} units", evaluations.len());
        if self.config.parallel_units {
            evaluations.par_iter().map(decide).collect()
        } else {
            evaluations.iter().map(decide).collect()
        }
    }

    /// Record how the unit's attempt ended.
    ///
    /// Unless the attempt failed, the captured snapshots become the unit's
    /// history for the next decision. A failed attempt leaves the history
    /// untouched so a retry sees the same changes. Returns whether anything
    /// was committed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the store fails.
    pub fn complete<S>(
        &self,
        store: &S,
        unit: &UnitOfWork,
        outcome: ExecutionOutcome,
        current: &CurrentSnapshots,
    ) -> SnapshotResult<bool>
    where
        S: SnapshotStore + ?Sized,
    {
        if !outcome.commits() {
            debug!("{} failed, keeping previous snapshots", unit.identity());
            return Ok(false);
        }

        let history = UnitHistory::from_current(unit.implementation.clone(), current);
        debug!(
            "Committing {} snapshots for {} ({:?}, {} incomplete)",
            history.snapshots.len(),
            unit.identity(),
            outcome,
            history.incomplete.len()
        );
        store.commit(unit.identity(), history)?;
        Ok(true)
    }
}

fn is_empty(spec: &PropertySpec, current: &CurrentSnapshots) -> bool {
    match current.get(PropertyRole::Input, spec.name()) {
        Observation::Captured(snapshot) => snapshot.is_empty(),
        Observation::Unresolved => spec.is_optional(),
        Observation::Incomplete(_) => false,
    }
}
