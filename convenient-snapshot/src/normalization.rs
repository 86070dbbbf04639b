//! Path normalization strategies
//!
//! A normalization strategy maps a raw file path to the identity used when
//! comparing snapshots. Stricter strategies notice more (a file moving
//! between directories), looser ones ignore variance that does not matter
//! for the unit of work (the checkout location of the whole tree).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Identity assigned to every entry under [`NormalizationStrategy::None`].
pub const IGNORED_IDENTITY: &str = "";

/// How sensitive a property is to the location of its files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSensitivity {
    /// The full path matters
    Absolute,
    /// Only the path below the collection root matters
    Relative,
    /// Only the file name matters
    NameOnly,
    /// Only file contents matter
    None,
}

/// Strategy deriving a comparison identity from a raw path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationStrategy {
    /// Identity is the full path
    #[default]
    Absolute,
    /// Identity is the path relative to the collection root
    Relative,
    /// Identity is the base name of the file
    NameOnly,
    /// Identity is a constant; entries are matched by content alone
    None,
}

impl From<PathSensitivity> for NormalizationStrategy {
    fn from(sensitivity: PathSensitivity) -> Self {
        match sensitivity {
            PathSensitivity::Absolute => Self::Absolute,
            PathSensitivity::Relative => Self::Relative,
            PathSensitivity::NameOnly => Self::NameOnly,
            PathSensitivity::None => Self::None,
        }
    }
}

impl NormalizationStrategy {
    /// Compute the comparison identity of `path`.
    ///
    /// `root` is the declared root of the property's collection. Paths that
    /// do not live below it (or a missing root) fall back to the file name
    /// under [`NormalizationStrategy::Relative`], matching how a single file
    /// passed as its own root is treated.
    #[must_use]
    pub fn normalize(self, path: &Path, root: Option<&Path>) -> String {
        match self {
            Self::Absolute => path.to_string_lossy().into_owned(),
            Self::Relative => root
                .and_then(|root| path.strip_prefix(root).ok())
                .filter(|relative| relative.components().next().is_some())
                .map_or_else(|| file_name(path), join_components),
            Self::NameOnly => file_name(path),
            Self::None => IGNORED_IDENTITY.to_string(),
        }
    }

    /// Whether identities carry no path information at all.
    ///
    /// Entries of such snapshots are keyed by their digest when compared.
    #[must_use]
    pub fn ignores_path(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether distinct raw paths are expected to be able to share an identity
    #[must_use]
    pub fn may_collide(self) -> bool {
        matches!(self, Self::NameOnly | Self::None)
    }
}

impl fmt::Display for NormalizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absolute => "ABSOLUTE",
            Self::Relative => "RELATIVE",
            Self::NameOnly => "NAME_ONLY",
            Self::None => "NONE",
        };
        f.write_str(name)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// Forward slashes regardless of platform so identities compare across hosts.
fn join_components(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
