//! Error types for change detection.
//!
//! Only invalid configuration and internal programming errors are errors.
//! Anything that merely makes the up-to-date answer uncertain is reported
//! as a change instead, so the unit of work re-executes.

use crate::normalization::NormalizationStrategy;
use crate::property::PropertyRole;

/// Configuration errors. Fatal, surfaced immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A property spec was frozen before a name was assigned
    #[error("Property of unit '{unit}' has no name")]
    MissingName {
        /// Unit of work the property was declared on
        unit: String,
    },

    /// Two properties with the same name and role on one unit
    #[error("Duplicate {role} property '{name}' on unit '{unit}'")]
    DuplicateProperty {
        /// Unit of work
        unit: String,
        /// Property name
        name: String,
        /// Input or output
        role: PropertyRole,
    },

    /// A property declared on a different unit was added to this set
    #[error("Property '{name}' belongs to unit '{owner}', not '{unit}'")]
    ForeignProperty {
        /// Unit of the property set
        unit: String,
        /// Unit the spec was built for
        owner: String,
        /// Property name
        name: String,
    },

    /// `skip_when_empty` was requested on an output property
    #[error("Output property '{name}' of unit '{unit}' cannot skip when empty")]
    SkipWhenEmptyOnOutput {
        /// Unit of work
        unit: String,
        /// Property name
        name: String,
    },

    /// A required property's source could not be resolved at all
    #[error("Required {role} property '{name}' of unit '{unit}' could not be resolved")]
    UnresolvedProperty {
        /// Unit of work
        unit: String,
        /// Property name
        name: String,
        /// Input or output
        role: PropertyRole,
    },

    /// Snapshot production failed for a required property
    #[error("Snapshot of required property '{name}' of unit '{unit}' is incomplete: {cause}")]
    IncompleteRequiredProperty {
        /// Unit of work
        unit: String,
        /// Property name
        name: String,
        /// What the snapshotter reported
        cause: String,
    },
}

/// Errors raised while detecting changes or loading engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Invalid unit or property configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A snapshot was produced under a different normalization than the
    /// property declares. Indicates a bug in the caller, not a user condition.
    #[error("Snapshot of property '{property}' uses {found} normalization, expected {expected}")]
    StrategyMismatch {
        /// Property name
        property: String,
        /// Normalization declared by the property
        expected: NormalizationStrategy,
        /// Normalization the snapshot was produced under
        found: NormalizationStrategy,
    },

    /// The snapshot store failed to load or commit a unit's history
    #[error("Snapshot store error: {0}")]
    Store(String),

    /// Engine configuration could not be read
    #[error("Failed to read engine config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Engine configuration could not be parsed
    #[error("Invalid engine config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for change detection operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
