//! Execution decisions and their rationale

use crate::compare::ChangeResult;
use crate::property::PropertyRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a unit of work can be skipped without running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An input flagged `skip_when_empty` has no files
    EmptyInputTriggersSkip {
        /// The empty input
        property: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInputTriggersSkip { property } => {
                write!(f, "input '{property}' is empty")
            }
        }
    }
}

/// Why a unit of work must run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionReason {
    /// The unit never completed a run
    NoHistory,

    /// The unit's own implementation differs from the last run
    ImplementationChanged {
        /// Implementation recorded for the last run
        previous: Option<String>,
        /// Implementation now
        current: Option<String>,
    },

    /// A declared property is not unchanged
    PropertyChanged {
        /// Input or output
        role: PropertyRole,
        /// Property name
        name: String,
        /// Classified change
        change: ChangeResult,
    },

    /// A property recorded last run is no longer declared
    PropertyUndeclared {
        /// Input or output
        role: PropertyRole,
        /// Property name
        name: String,
    },

    /// The snapshot of an optional property could not be completed
    IncompleteSnapshot {
        /// Input or output
        role: PropertyRole,
        /// Property name
        name: String,
        /// What the snapshotter reported
        cause: String,
    },
}

impl fmt::Display for ExecutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHistory => f.write_str("no history is available"),
            Self::ImplementationChanged { .. } => f.write_str("implementation has changed"),
            Self::PropertyChanged { role, name, change } => {
                write!(f, "{role} property '{name}' is {}", change.status)?;
                if let Some(first) = change.details.first() {
                    write!(f, " ({first}")?;
                    if change.details.len() > 1 {
                        write!(f, " and {} more", change.details.len() - 1)?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
            Self::PropertyUndeclared { role, name } => {
                write!(f, "{role} property '{name}' was removed")
            }
            Self::IncompleteSnapshot { role, name, cause } => {
                write!(f, "{role} property '{name}' could not be snapshotted: {cause}")
            }
        }
    }
}

/// Outcome of up-to-date checking for one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Nothing relevant changed
    UpToDate,
    /// The unit has nothing to do
    Skip(SkipReason),
    /// The unit must run; at least one reason, first applicable first
    MustExecute(Vec<ExecutionReason>),
}

impl Decision {
    /// Whether the unit must run
    #[must_use]
    pub fn must_execute(&self) -> bool {
        matches!(self, Self::MustExecute(_))
    }

    /// Whether the unit is up to date
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }

    /// Whether the unit is skipped
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    /// Reasons to run; empty unless the unit must run
    #[must_use]
    pub fn reasons(&self) -> &[ExecutionReason] {
        match self {
            Self::MustExecute(reasons) => reasons.as_slice(),
            Self::UpToDate | Self::Skip(_) => &[],
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => f.write_str("UP-TO-DATE"),
            Self::Skip(reason) => write!(f, "SKIPPED: {reason}"),
            Self::MustExecute(reasons) => {
                f.write_str("EXECUTE")?;
                if let Some(first) = reasons.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
        }
    }
}

/// How an attempted unit of work ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The unit ran and succeeded
    Executed,
    /// The unit was skipped
    Skipped,
    /// The unit was up to date and did not run
    UpToDate,
    /// The unit ran and failed
    Failed,
}

impl ExecutionOutcome {
    /// Whether the observed snapshots become the new history
    #[must_use]
    pub fn commits(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Counts over a batch of decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStats {
    /// Units decided
    pub total: usize,
    /// Up-to-date units
    pub up_to_date: usize,
    /// Skipped units
    pub skipped: usize,
    /// Units that must run
    pub must_execute: usize,
    /// Units that must run because they never ran
    pub no_history: usize,
    /// Units whose detection failed
    pub errors: usize,
}

impl DecisionStats {
    /// Count one decision
    pub fn record(&mut self, decision: &Decision) {
        self.total += 1;
        match decision {
            Decision::UpToDate => self.up_to_date += 1,
            Decision::Skip(_) => self.skipped += 1,
            Decision::MustExecute(reasons) => {
                self.must_execute += 1;
                if reasons.first() == Some(&ExecutionReason::NoHistory) {
                    self.no_history += 1;
                }
            }
        }
    }

    /// Count a unit whose detection failed
    pub fn record_error(&mut self) {
        self.total += 1;
        self.errors += 1;
    }

    /// Share of units that did not need to run
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avoidance_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.up_to_date + self.skipped) as f64 / self.total as f64
    }
}

impl<'a> FromIterator<&'a Decision> for DecisionStats {
    fn from_iter<I: IntoIterator<Item = &'a Decision>>(iter: I) -> Self {
        let mut stats = Self::default();
        for decision in iter {
            stats.record(decision);
        }
        stats
    }
}

impl fmt::Display for DecisionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Up-to-date check")?;
        writeln!(f, "───────────────────────────────────")?;
        writeln!(f, "Units:           {}", self.total)?;
        writeln!(f, "  Up-to-date:    {}", self.up_to_date)?;
        writeln!(f, "  Skipped:       {}", self.skipped)?;
        writeln!(f, "  Must execute:  {}", self.must_execute)?;
        writeln!(f, "    No history:  {}", self.no_history)?;
        writeln!(f, "  Errors:        {}", self.errors)?;
        writeln!(f, "Avoided:         {:.1}%", self.avoidance_rate() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ChangeStatus;

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::UpToDate.to_string(), "UP-TO-DATE");
        assert_eq!(
            Decision::Skip(SkipReason::EmptyInputTriggersSkip {
                property: "sources".to_string()
            })
            .to_string(),
            "SKIPPED: input 'sources' is empty"
        );

        let changed = Decision::MustExecute(vec![ExecutionReason::PropertyChanged {
            role: PropertyRole::Output,
            name: "objects".to_string(),
            change: ChangeResult::with_status(ChangeStatus::Incompatible, Vec::new()),
        }]);
        assert_eq!(changed.to_string(), "EXECUTE: output property 'objects' is incompatible");
    }

    #[test]
    fn test_failed_outcome_does_not_commit() {
        assert!(ExecutionOutcome::Executed.commits());
        assert!(ExecutionOutcome::Skipped.commits());
        assert!(ExecutionOutcome::UpToDate.commits());
        assert!(!ExecutionOutcome::Failed.commits());
    }

    #[test]
    fn test_stats() {
        let decisions = [
            Decision::UpToDate,
            Decision::UpToDate,
            Decision::Skip(SkipReason::EmptyInputTriggersSkip {
                property: "sources".to_string(),
            }),
            Decision::MustExecute(vec![ExecutionReason::NoHistory]),
        ];
        let stats: DecisionStats = decisions.iter().collect();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.up_to_date, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.must_execute, 1);
        assert_eq!(stats.no_history, 1);
        assert!((stats.avoidance_rate() - 0.75).abs() < f64::EPSILON);
        assert!(stats.to_string().contains("Avoided:         75.0%"));
    }
}
