//! Snapshot compare strategies
//!
//! Two strategies exist. [`CompareStrategy::Unordered`] treats snapshots as
//! sets keyed by identity, which is what file collections need since their
//! iteration order is not stable across runs. [`CompareStrategy::Ordered`]
//! treats them as sequences for properties where order carries meaning.

use crate::snapshot::{FileDigest, NormalizedEntry, Snapshot};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Classification of a property's change between two runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Nothing relevant changed
    Unchanged,
    /// Entries were added, removed or modified
    Changed,
    /// No previous state; every current entry is new
    Added,
    /// No current state; every previous entry is gone
    Removed,
    /// The snapshots cannot be compared reliably
    Incompatible,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Incompatible => "incompatible",
        };
        f.write_str(name)
    }
}

/// What happened to a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    /// Present now, absent before
    Added,
    /// Present before, absent now
    Removed,
    /// Present in both with different content
    Modified,
}

/// Change of one entry between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDelta {
    /// Normalized identity of the entry
    pub identity: String,
    /// Kind of change
    pub kind: DeltaKind,
    /// Digest in the previous snapshot
    pub previous: Option<FileDigest>,
    /// Digest in the current snapshot
    pub current: Option<FileDigest>,
}

impl EntryDelta {
    fn added(entry: &NormalizedEntry) -> Self {
        Self {
            identity: entry.identity.clone(),
            kind: DeltaKind::Added,
            previous: None,
            current: Some(entry.digest),
        }
    }

    fn removed(entry: &NormalizedEntry) -> Self {
        Self {
            identity: entry.identity.clone(),
            kind: DeltaKind::Removed,
            previous: Some(entry.digest),
            current: None,
        }
    }

    fn modified(identity: &str, previous: FileDigest, current: FileDigest) -> Self {
        Self {
            identity: identity.to_string(),
            kind: DeltaKind::Modified,
            previous: Some(previous),
            current: Some(current),
        }
    }
}

impl fmt::Display for EntryDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeltaKind::Added => write!(f, "+ {}", self.identity),
            DeltaKind::Removed => write!(f, "- {}", self.identity),
            DeltaKind::Modified => write!(f, "~ {}", self.identity),
        }
    }
}

/// Result of comparing one property's snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    /// Overall classification
    pub status: ChangeStatus,
    /// Per-entry deltas, in a deterministic order
    pub details: Vec<EntryDelta>,
    /// Identities that made the snapshots incomparable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    /// Whether `details` was cut short for reporting
    #[serde(default)]
    pub truncated: bool,
}

impl ChangeResult {
    /// Nothing changed
    #[must_use]
    pub fn unchanged() -> Self {
        Self::with_status(ChangeStatus::Unchanged, Vec::new())
    }

    /// Result with the given status and deltas
    #[must_use]
    pub fn with_status(status: ChangeStatus, details: Vec<EntryDelta>) -> Self {
        Self {
            status,
            details,
            conflicts: Vec::new(),
            truncated: false,
        }
    }

    /// `Changed` if there are deltas, `Unchanged` otherwise
    #[must_use]
    pub fn from_deltas(details: Vec<EntryDelta>) -> Self {
        if details.is_empty() {
            Self::unchanged()
        } else {
            Self::with_status(ChangeStatus::Changed, details)
        }
    }

    /// The snapshots could not be compared because of the given identities
    #[must_use]
    pub fn incompatible(conflicts: Vec<String>) -> Self {
        Self {
            status: ChangeStatus::Incompatible,
            details: Vec::new(),
            conflicts,
            truncated: false,
        }
    }

    /// Every entry of `snapshot` is new
    #[must_use]
    pub fn all_added(snapshot: &Snapshot) -> Self {
        Self::with_status(
            ChangeStatus::Added,
            snapshot.entries().iter().map(EntryDelta::added).collect(),
        )
    }

    /// Every entry of `snapshot` is gone
    #[must_use]
    pub fn all_removed(snapshot: &Snapshot) -> Self {
        Self::with_status(
            ChangeStatus::Removed,
            snapshot.entries().iter().map(EntryDelta::removed).collect(),
        )
    }

    /// Whether the property is up to date
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.status == ChangeStatus::Unchanged
    }

    /// Keep at most `max` deltas. The status is left alone.
    pub fn truncate(&mut self, max: usize) {
        if self.details.len() > max {
            self.details.truncate(max);
            self.truncated = true;
        }
    }
}

/// Strategy for diffing two snapshots of the same property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareStrategy {
    /// Position by position
    Ordered,
    /// As sets keyed by identity
    #[default]
    Unordered,
}

impl fmt::Display for CompareStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordered => f.write_str("ordered"),
            Self::Unordered => f.write_str("unordered"),
        }
    }
}

impl CompareStrategy {
    /// Compare two snapshots on the calling thread
    #[must_use]
    pub fn compare(self, previous: &Snapshot, current: &Snapshot) -> ChangeResult {
        self.compare_with_threshold(previous, current, usize::MAX)
    }

    /// Compare two snapshots.
    ///
    /// For unordered comparison, the identity maps are built in parallel
    /// once both snapshots hold more than `parallel_threshold` entries.
    #[must_use]
    pub fn compare_with_threshold(
        self,
        previous: &Snapshot,
        current: &Snapshot,
        parallel_threshold: usize,
    ) -> ChangeResult {
        match self {
            Self::Ordered => compare_ordered(previous.entries(), current.entries()),
            Self::Unordered => {
                if previous.has_collisions() || current.has_collisions() {
                    let mut conflicts = previous.collisions().to_vec();
                    for identity in current.collisions() {
                        if !conflicts.contains(identity) {
                            conflicts.push(identity.clone());
                        }
                    }
                    return ChangeResult::incompatible(conflicts);
                }
                let parallel =
                    previous.len() > parallel_threshold && current.len() > parallel_threshold;
                compare_unordered(previous.entries(), current.entries(), parallel)
            }
        }
    }
}

/// Trim the common prefix and suffix; whatever differs in between is
/// reported as one aggregate delta.
fn compare_ordered(previous: &[NormalizedEntry], current: &[NormalizedEntry]) -> ChangeResult {
    let prefix = previous
        .iter()
        .zip(current)
        .take_while(|(p, c)| p == c)
        .count();
    let suffix = previous[prefix..]
        .iter()
        .rev()
        .zip(current[prefix..].iter().rev())
        .take_while(|(p, c)| p == c)
        .count();

    let previous = &previous[prefix..previous.len() - suffix];
    let current = &current[prefix..current.len() - suffix];

    let delta = match (previous.first(), current.first()) {
        (None, None) => return ChangeResult::unchanged(),
        (None, Some(added)) => EntryDelta::added(added),
        (Some(removed), None) => EntryDelta::removed(removed),
        (Some(p), Some(c)) => EntryDelta {
            identity: c.identity.clone(),
            kind: DeltaKind::Modified,
            previous: Some(p.digest),
            current: Some(c.digest),
        },
    };
    ChangeResult::with_status(ChangeStatus::Changed, vec![delta])
}

/// identity -> digest -> occurrences
type Multiset<'a> = HashMap<&'a str, HashMap<FileDigest, usize>>;

fn build_multiset(entries: &[NormalizedEntry], parallel: bool) -> Multiset<'_> {
    fn add<'a>(mut set: Multiset<'a>, entry: &'a NormalizedEntry) -> Multiset<'a> {
        *set.entry(entry.identity.as_str())
            .or_default()
            .entry(entry.digest)
            .or_insert(0) += 1;
        set
    }

    if parallel {
        entries
            .par_iter()
            .fold(HashMap::new, add)
            .reduce(HashMap::new, |mut left, right| {
                for (identity, digests) in right {
                    let slot = left.entry(identity).or_default();
                    for (digest, count) in digests {
                        *slot.entry(digest).or_insert(0) += count;
                    }
                }
                left
            })
    } else {
        entries.iter().fold(HashMap::new(), add)
    }
}

fn single(digests: &HashMap<FileDigest, usize>) -> Option<FileDigest> {
    match digests.iter().next() {
        Some((digest, &1)) if digests.len() == 1 => Some(*digest),
        _ => None,
    }
}

/// Set comparison keyed by identity.
///
/// An identity held by exactly one entry on each side is compared by digest
/// and reported as `Modified` when the digests differ. Identities shared by
/// several entries (only possible when paths are ignored) are compared as
/// multisets of digests, reporting unmatched entries as added or removed.
/// Renames are never inferred. Deltas follow the entry order of the
/// previous snapshot, then of the current one.
fn compare_unordered(
    previous: &[NormalizedEntry],
    current: &[NormalizedEntry],
    parallel: bool,
) -> ChangeResult {
    let (previous_set, current_set) = if parallel {
        rayon::join(
            || build_multiset(previous, true),
            || build_multiset(current, true),
        )
    } else {
        (build_multiset(previous, false), build_multiset(current, false))
    };

    let mut details = Vec::new();
    // Occurrences of (identity, digest) still available for matching
    let mut unmatched_current: HashMap<(&str, FileDigest), usize> = HashMap::new();
    let mut unmatched_previous: HashMap<(&str, FileDigest), usize> = HashMap::new();

    for entry in previous {
        let identity = entry.identity.as_str();
        let Some(current_digests) = current_set.get(identity) else {
            details.push(EntryDelta::removed(entry));
            continue;
        };
        let previous_digests = &previous_set[identity];

        if let (Some(before), Some(after)) = (single(previous_digests), single(current_digests)) {
            if before != after {
                details.push(EntryDelta::modified(identity, before, after));
            }
            continue;
        }

        let available = unmatched_current
            .entry((identity, entry.digest))
            .or_insert_with(|| current_digests.get(&entry.digest).copied().unwrap_or(0));
        if *available > 0 {
            *available -= 1;
        } else {
            details.push(EntryDelta::removed(entry));
        }
    }

    for entry in current {
        let identity = entry.identity.as_str();
        let Some(previous_digests) = previous_set.get(identity) else {
            details.push(EntryDelta::added(entry));
            continue;
        };
        let current_digests = &current_set[identity];

        if single(previous_digests).is_some() && single(current_digests).is_some() {
            continue;
        }

        let available = unmatched_previous
            .entry((identity, entry.digest))
            .or_insert_with(|| previous_digests.get(&entry.digest).copied().unwrap_or(0));
        if *available > 0 {
            *available -= 1;
        } else {
            details.push(EntryDelta::added(entry));
        }
    }

    ChangeResult::from_deltas(details)
}
