//! Declared input and output properties
//!
//! A [`PropertySpec`] is the contract of one input or output of a unit of
//! work: its name, where its files come from, how their paths are
//! normalized and how its snapshots are compared. Specs are assembled with
//! an owned [`PropertySpecBuilder`] during configuration and frozen before
//! change detection reads them, so a spec can never change under the
//! detector.

use crate::compare::CompareStrategy;
use crate::error::ConfigError;
use crate::normalization::{NormalizationStrategy, PathSensitivity};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Whether a property is consumed or produced by the unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyRole {
    /// Consumed by the unit
    Input,
    /// Produced by the unit
    Output,
}

impl fmt::Display for PropertyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Shape of the file source behind a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A file collection. Iteration order carries no meaning.
    #[default]
    FileCollection,
    /// An ordered list of files, such as a search path
    OrderedFiles,
}

/// Unresolved description of a property's files.
///
/// Resolution (globbing, variable expansion, walking directories) is done
/// by the snapshotter; change detection only keeps the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileSource {
    /// Root the collection is declared relative to
    pub root: Option<PathBuf>,
    /// Declared paths or patterns
    pub paths: Vec<PathBuf>,
    /// Collection or ordered list
    pub kind: SourceKind,
}

impl FileSource {
    /// An unordered collection of the given paths
    pub fn collection<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            root: None,
            paths: paths.into_iter().map(Into::into).collect(),
            kind: SourceKind::FileCollection,
        }
    }

    /// An ordered list of the given paths
    pub fn ordered<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            kind: SourceKind::OrderedFiles,
            ..Self::collection(paths)
        }
    }

    /// Declare the root relative identities are computed against
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

/// Which external snapshotter produces a property's snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotterKind(Cow<'static, str>);

impl SnapshotterKind {
    /// The generic file collection snapshotter
    pub const GENERIC: Self = Self(Cow::Borrowed("generic-file-collection"));

    /// A snapshotter identified by `tag`
    #[must_use]
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    /// The kind tag
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotterKind {
    fn default() -> Self {
        Self::GENERIC
    }
}

impl fmt::Display for SnapshotterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frozen declaration of one input or output property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    unit: String,
    name: String,
    role: PropertyRole,
    source: FileSource,
    optional: bool,
    skip_when_empty: bool,
    normalization: NormalizationStrategy,
    snapshotter: SnapshotterKind,
}

impl PropertySpec {
    /// Start declaring an input of `unit`
    pub fn input(
        unit: impl Into<String>,
        skip_when_empty: bool,
        source: FileSource,
    ) -> PropertySpecBuilder {
        PropertySpecBuilder::new(unit.into(), PropertyRole::Input, source)
            .skip_when_empty(skip_when_empty)
    }

    /// Start declaring an output of `unit`
    pub fn output(unit: impl Into<String>, source: FileSource) -> PropertySpecBuilder {
        PropertySpecBuilder::new(unit.into(), PropertyRole::Output, source)
    }

    /// Unit of work the property belongs to
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Property name, unique per role within the unit
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input or output
    #[must_use]
    pub fn role(&self) -> PropertyRole {
        self.role
    }

    /// Declared file source
    #[must_use]
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Whether an unresolvable source is acceptable
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether an empty collection lets the whole unit be skipped
    #[must_use]
    pub fn is_skip_when_empty(&self) -> bool {
        self.skip_when_empty
    }

    /// Normalization applied to the property's paths
    #[must_use]
    pub fn normalization(&self) -> NormalizationStrategy {
        self.normalization
    }

    /// Compare strategy, fixed by the kind of source
    #[must_use]
    pub fn compare_strategy(&self) -> CompareStrategy {
        match self.source.kind {
            SourceKind::FileCollection => CompareStrategy::Unordered,
            SourceKind::OrderedFiles => CompareStrategy::Ordered,
        }
    }

    /// Snapshotter requested for this property
    #[must_use]
    pub fn snapshotter(&self) -> &SnapshotterKind {
        &self.snapshotter
    }

    /// Total order by name, for deterministic iteration
    #[must_use]
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.normalization)
    }
}

/// Owned builder for a [`PropertySpec`]
#[derive(Debug, Clone)]
#[must_use]
pub struct PropertySpecBuilder {
    unit: String,
    name: Option<String>,
    role: PropertyRole,
    source: FileSource,
    optional: bool,
    skip_when_empty: bool,
    normalization: NormalizationStrategy,
    snapshotter: SnapshotterKind,
}

impl PropertySpecBuilder {
    fn new(unit: String, role: PropertyRole, source: FileSource) -> Self {
        Self {
            unit,
            name: None,
            role,
            source,
            optional: false,
            skip_when_empty: false,
            normalization: NormalizationStrategy::default(),
            snapshotter: SnapshotterKind::default(),
        }
    }

    /// Assign the property name
    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Let an empty collection skip the whole unit (inputs only)
    pub fn skip_when_empty(mut self, skip_when_empty: bool) -> Self {
        self.skip_when_empty = skip_when_empty;
        self
    }

    /// Accept a source that cannot be resolved
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set the normalization through its path sensitivity
    pub fn with_path_sensitivity(self, sensitivity: PathSensitivity) -> Self {
        self.with_snapshot_normalization_strategy(sensitivity.into())
    }

    /// Set the normalization strategy
    pub fn with_snapshot_normalization_strategy(
        mut self,
        normalization: NormalizationStrategy,
    ) -> Self {
        self.normalization = normalization;
        self
    }

    /// Request a specific snapshotter
    pub fn with_snapshotter(mut self, snapshotter: SnapshotterKind) -> Self {
        self.snapshotter = snapshotter;
        self
    }

    /// Freeze the declaration.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingName` if no name was assigned
    /// - `ConfigError::SkipWhenEmptyOnOutput` for an output flagged `skip_when_empty`
    pub fn build(self) -> Result<PropertySpec, ConfigError> {
        let Some(name) = self.name.filter(|name| !name.is_empty()) else {
            return Err(ConfigError::MissingName { unit: self.unit });
        };
        if self.skip_when_empty && self.role == PropertyRole::Output {
            return Err(ConfigError::SkipWhenEmptyOnOutput {
                unit: self.unit,
                name,
            });
        }

        Ok(PropertySpec {
            unit: self.unit,
            name,
            role: self.role,
            source: self.source,
            optional: self.optional,
            skip_when_empty: self.skip_when_empty,
            normalization: self.normalization,
            snapshotter: self.snapshotter,
        })
    }
}

/// All declared properties of one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    unit: String,
    specs: Vec<PropertySpec>,
}

impl PropertySet {
    /// Empty set for `unit`
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            specs: Vec::new(),
        }
    }

    /// Build a set from frozen specs, in declaration order
    ///
    /// # Errors
    ///
    /// See [`PropertySet::add`].
    pub fn from_specs(
        unit: impl Into<String>,
        specs: impl IntoIterator<Item = PropertySpec>,
    ) -> Result<Self, ConfigError> {
        let mut set = Self::new(unit);
        for spec in specs {
            set.add(spec)?;
        }
        Ok(set)
    }

    /// Declare another property.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ForeignProperty` if the spec was built for another unit
    /// - `ConfigError::DuplicateProperty` if the name is taken for this role
    pub fn add(&mut self, spec: PropertySpec) -> Result<(), ConfigError> {
        if spec.unit != self.unit {
            return Err(ConfigError::ForeignProperty {
                unit: self.unit.clone(),
                owner: spec.unit,
                name: spec.name,
            });
        }
        if self.get(spec.role, &spec.name).is_some() {
            return Err(ConfigError::DuplicateProperty {
                unit: self.unit.clone(),
                name: spec.name,
                role: spec.role,
            });
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Unit the properties belong to
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Look up a property
    #[must_use]
    pub fn get(&self, role: PropertyRole, name: &str) -> Option<&PropertySpec> {
        self.specs
            .iter()
            .find(|spec| spec.role == role && spec.name == name)
    }

    /// Inputs in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = &PropertySpec> {
        self.specs.iter().filter(|spec| spec.role == PropertyRole::Input)
    }

    /// Outputs in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &PropertySpec> {
        self.specs.iter().filter(|spec| spec.role == PropertyRole::Output)
    }

    /// Inputs then outputs, each in declaration order
    pub fn in_evaluation_order(&self) -> impl Iterator<Item = &PropertySpec> {
        self.inputs().chain(self.outputs())
    }

    /// All properties ordered by name, inputs before outputs on ties
    #[must_use]
    pub fn sorted_by_name(&self) -> Vec<&PropertySpec> {
        let mut sorted: Vec<_> = self.specs.iter().collect();
        sorted.sort_by(|a, b| a.cmp_by_name(b).then(a.role.cmp(&b.role)));
        sorted
    }

    /// Number of declared properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> FileSource {
        FileSource::collection(["src/**/*.c"]).with_root("/work")
    }

    #[test]
    fn test_builder_defaults() {
        let spec = PropertySpec::input("compile", false, sources())
            .with_property_name("sources")
            .build()
            .unwrap();

        assert_eq!(spec.name(), "sources");
        assert_eq!(spec.role(), PropertyRole::Input);
        assert_eq!(spec.normalization(), NormalizationStrategy::Absolute);
        assert_eq!(spec.compare_strategy(), CompareStrategy::Unordered);
        assert_eq!(spec.snapshotter(), &SnapshotterKind::GENERIC);
        assert!(!spec.is_optional());
        assert!(!spec.is_skip_when_empty());
    }

    #[test]
    fn test_builder_fluent_setters() {
        let spec = PropertySpec::input("compile", true, sources())
            .with_property_name("headers")
            .optional(true)
            .with_path_sensitivity(PathSensitivity::NameOnly)
            .with_snapshotter(SnapshotterKind::new("header-scanner"))
            .build()
            .unwrap();

        assert!(spec.is_skip_when_empty());
        assert!(spec.is_optional());
        assert_eq!(spec.normalization(), NormalizationStrategy::NameOnly);
        assert_eq!(spec.snapshotter().as_str(), "header-scanner");
        assert_eq!(spec.to_string(), "headers (NAME_ONLY)");
    }

    #[test]
    fn test_ordered_source_uses_ordered_compare() {
        let spec = PropertySpec::input("link", false, FileSource::ordered(["a.o", "b.o"]))
            .with_property_name("objects")
            .build()
            .unwrap();
        assert_eq!(spec.compare_strategy(), CompareStrategy::Ordered);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let result = PropertySpec::input("compile", false, sources()).build();
        assert_eq!(
            result,
            Err(ConfigError::MissingName {
                unit: "compile".to_string()
            })
        );
    }

    #[test]
    fn test_skip_when_empty_output_is_rejected() {
        let result = PropertySpec::output("compile", sources())
            .with_property_name("objects")
            .skip_when_empty(true)
            .build();
        assert!(matches!(result, Err(ConfigError::SkipWhenEmptyOnOutput { .. })));
    }

    #[test]
    fn test_duplicate_name_and_role() {
        let make = |name: &str| {
            PropertySpec::input("compile", false, sources())
                .with_property_name(name)
                .build()
                .unwrap()
        };
        let mut set = PropertySet::new("compile");
        set.add(make("sources")).unwrap();

        let err = set.add(make("sources")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProperty { role: PropertyRole::Input, .. }));

        // Same name with the other role is fine
        let output = PropertySpec::output("compile", sources())
            .with_property_name("sources")
            .build()
            .unwrap();
        set.add(output).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_foreign_property_is_rejected() {
        let spec = PropertySpec::output("link", sources())
            .with_property_name("binary")
            .build()
            .unwrap();
        let err = PropertySet::from_specs("compile", [spec]).unwrap_err();
        assert!(matches!(err, ConfigError::ForeignProperty { .. }));
    }

    #[test]
    fn test_orderings() {
        let input = |name: &str| {
            PropertySpec::input("unit", false, sources())
                .with_property_name(name)
                .build()
                .unwrap()
        };
        let output = PropertySpec::output("unit", sources())
            .with_property_name("a_out")
            .build()
            .unwrap();

        let set = PropertySet::from_specs("unit", [input("zeta"), output, input("alpha")]).unwrap();

        let evaluation: Vec<_> = set.in_evaluation_order().map(PropertySpec::name).collect();
        assert_eq!(evaluation, vec!["zeta", "alpha", "a_out"]);

        let by_name: Vec<_> = set.sorted_by_name().into_iter().map(PropertySpec::name).collect();
        assert_eq!(by_name, vec!["a_out", "alpha", "zeta"]);
    }
}
