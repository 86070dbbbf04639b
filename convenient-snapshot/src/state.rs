//! Per-unit snapshot sets
//!
//! [`UnitHistory`] is what a unit of work left behind on its last committed
//! run. [`CurrentSnapshots`] is what the snapshotter observed for the run
//! being decided, including properties it could not resolve or finish.

use crate::property::PropertyRole;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshots keyed by role and property name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySnapshots {
    /// Input snapshots by name
    #[serde(default)]
    pub inputs: BTreeMap<String, Snapshot>,
    /// Output snapshots by name
    #[serde(default)]
    pub outputs: BTreeMap<String, Snapshot>,
}

impl PropertySnapshots {
    /// Snapshot of a property
    #[must_use]
    pub fn get(&self, role: PropertyRole, name: &str) -> Option<&Snapshot> {
        self.by_role(role).get(name)
    }

    /// Record a property's snapshot, replacing an older one
    pub fn insert(&mut self, role: PropertyRole, name: impl Into<String>, snapshot: Snapshot) {
        let map = match role {
            PropertyRole::Input => &mut self.inputs,
            PropertyRole::Output => &mut self.outputs,
        };
        let _ = map.insert(name.into(), snapshot);
    }

    /// All snapshots of one role, ordered by name
    #[must_use]
    pub fn by_role(&self, role: PropertyRole) -> &BTreeMap<String, Snapshot> {
        match role {
            PropertyRole::Input => &self.inputs,
            PropertyRole::Output => &self.outputs,
        }
    }

    /// Role and name of every recorded property, inputs first
    pub fn keys(&self) -> impl Iterator<Item = (PropertyRole, &str)> {
        self.inputs
            .keys()
            .map(|name| (PropertyRole::Input, name.as_str()))
            .chain(
                self.outputs
                    .keys()
                    .map(|name| (PropertyRole::Output, name.as_str())),
            )
    }

    /// Number of recorded properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Whether nothing is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

/// State of a unit of work as of its last committed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHistory {
    /// Implementation fingerprint the unit ran with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    /// Property snapshots taken for that run
    pub snapshots: PropertySnapshots,
    /// Properties whose snapshot was incomplete when the run was committed.
    /// Their state is unknown, so the next decision cannot trust them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub incomplete: BTreeSet<(PropertyRole, String)>,
}

impl UnitHistory {
    /// History left behind by a run that observed `current`
    #[must_use]
    pub fn from_current(implementation: Option<String>, current: &CurrentSnapshots) -> Self {
        Self {
            implementation,
            snapshots: current.captured(),
            incomplete: current.incomplete(),
        }
    }

    /// Whether the property's snapshot was incomplete when last committed
    #[must_use]
    pub fn was_incomplete(&self, role: PropertyRole, name: &str) -> bool {
        self.incomplete
            .iter()
            .any(|(recorded, recorded_name)| *recorded == role && recorded_name == name)
    }

    /// Role and name of every property the run knew about, inputs first
    pub fn properties(&self) -> impl Iterator<Item = (PropertyRole, &str)> {
        self.snapshots.keys().chain(
            self.incomplete
                .iter()
                .map(|(role, name)| (*role, name.as_str())),
        )
    }
}

/// What the snapshotter produced for one property this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Snapshot produced
    Captured(Snapshot),
    /// The property's source could not be resolved
    Unresolved,
    /// Snapshot production failed or was cancelled
    Incomplete(String),
}

impl Observation {
    /// The snapshot, if one was produced
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Captured(snapshot) => Some(snapshot),
            Self::Unresolved | Self::Incomplete(_) => None,
        }
    }
}

static UNRESOLVED: Observation = Observation::Unresolved;

/// Observations for the run being decided, keyed by role and name.
///
/// A declared property without an observation counts as unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentSnapshots {
    inputs: BTreeMap<String, Observation>,
    outputs: BTreeMap<String, Observation>,
}

impl CurrentSnapshots {
    /// No observations yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a produced snapshot
    #[must_use]
    pub fn with_snapshot(
        self,
        role: PropertyRole,
        name: impl Into<String>,
        snapshot: Snapshot,
    ) -> Self {
        self.with_observation(role, name, Observation::Captured(snapshot))
    }

    /// Record an observation
    #[must_use]
    pub fn with_observation(
        mut self,
        role: PropertyRole,
        name: impl Into<String>,
        observation: Observation,
    ) -> Self {
        self.record(role, name, observation);
        self
    }

    /// Record an observation in place
    pub fn record(
        &mut self,
        role: PropertyRole,
        name: impl Into<String>,
        observation: Observation,
    ) {
        let map = match role {
            PropertyRole::Input => &mut self.inputs,
            PropertyRole::Output => &mut self.outputs,
        };
        let _ = map.insert(name.into(), observation);
    }

    /// Observation of a property; unresolved when nothing was recorded
    #[must_use]
    pub fn get(&self, role: PropertyRole, name: &str) -> &Observation {
        let map = match role {
            PropertyRole::Input => &self.inputs,
            PropertyRole::Output => &self.outputs,
        };
        map.get(name).unwrap_or(&UNRESOLVED)
    }

    /// Produced snapshots only, in the shape they are committed in
    #[must_use]
    pub fn captured(&self) -> PropertySnapshots {
        let collect = |map: &BTreeMap<String, Observation>| -> BTreeMap<String, Snapshot> {
            map.iter()
                .filter_map(|(name, observation)| {
                    observation.snapshot().map(|s| (name.clone(), s.clone()))
                })
                .collect()
        };
        PropertySnapshots {
            inputs: collect(&self.inputs),
            outputs: collect(&self.outputs),
        }
    }

    /// Properties whose snapshot production failed or was cancelled
    #[must_use]
    pub fn incomplete(&self) -> BTreeSet<(PropertyRole, String)> {
        let mut incomplete = BTreeSet::new();
        for (role, map) in [
            (PropertyRole::Input, &self.inputs),
            (PropertyRole::Output, &self.outputs),
        ] {
            for (name, observation) in map {
                if matches!(observation, Observation::Incomplete(_)) {
                    let _ = incomplete.insert((role, name.clone()));
                }
            }
        }
        incomplete
    }
}

impl From<PropertySnapshots> for CurrentSnapshots {
    fn from(snapshots: PropertySnapshots) -> Self {
        let wrap = |map: BTreeMap<String, Snapshot>| -> BTreeMap<String, Observation> {
            map.into_iter()
                .map(|(name, snapshot)| (name, Observation::Captured(snapshot)))
                .collect()
        };
        Self {
            inputs: wrap(snapshots.inputs),
            outputs: wrap(snapshots.outputs),
        }
    }
}
