//! Immutable property snapshots
//!
//! A [`Snapshot`] is the observed state of one property's files: an ordered
//! list of normalized identities with the content digest of each file. The
//! snapshotter that walks the filesystem and hashes contents lives outside
//! this crate; it hands over raw path/digest pairs which are normalized
//! here, or entries it already normalized itself.

use crate::normalization::NormalizationStrategy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Length of a content digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Content hash of a single file. Opaque to change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileDigest([u8; DIGEST_LEN]);

impl FileDigest {
    /// Wrap raw digest bytes produced by a snapshotter
    #[must_use]
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// SHA-256 of `content`
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Parse a 64 character hex string
    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Full lowercase hex representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, like commit ids
        f.write_str(&hex::encode(&self.0[..4]))
    }
}

/// One file of a snapshot after normalization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedEntry {
    /// Comparison identity
    pub identity: String,
    /// Content digest
    pub digest: FileDigest,
}

impl NormalizedEntry {
    /// Create an entry
    pub fn new(identity: impl Into<String>, digest: FileDigest) -> Self {
        Self {
            identity: identity.into(),
            digest,
        }
    }
}

/// A file as reported by the external snapshotter, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Resolved path of the file
    pub path: PathBuf,
    /// Content digest
    pub digest: FileDigest,
}

impl RawEntry {
    /// Create a raw entry
    pub fn new(path: impl Into<PathBuf>, digest: FileDigest) -> Self {
        Self {
            path: path.into(),
            digest,
        }
    }
}

/// Immutable record of a property's files at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotRecord")]
pub struct Snapshot {
    normalization: NormalizationStrategy,
    entries: Vec<NormalizedEntry>,
    /// Identities shared by more than one distinct file
    #[serde(skip_serializing_if = "Vec::is_empty")]
    collisions: Vec<String>,
}

/// Stored form of a snapshot. Collisions are derived from the entries on
/// load rather than trusted.
#[derive(Deserialize)]
struct SnapshotRecord {
    normalization: NormalizationStrategy,
    entries: Vec<NormalizedEntry>,
}

impl From<SnapshotRecord> for Snapshot {
    fn from(record: SnapshotRecord) -> Self {
        Self::new(record.normalization, record.entries)
    }
}

impl Snapshot {
    /// Snapshot with no files
    #[must_use]
    pub fn empty(normalization: NormalizationStrategy) -> Self {
        Self {
            normalization,
            entries: Vec::new(),
            collisions: Vec::new(),
        }
    }

    /// Build a snapshot from entries the snapshotter already normalized.
    ///
    /// Repeated identities are recorded as collisions, except under
    /// [`NormalizationStrategy::None`] where every entry shares the same
    /// identity and files are told apart by content.
    #[must_use]
    pub fn new(normalization: NormalizationStrategy, entries: Vec<NormalizedEntry>) -> Self {
        let collisions = if normalization.ignores_path() {
            Vec::new()
        } else {
            duplicate_identities(entries.iter().map(|entry| entry.identity.as_str()))
        };
        Self {
            normalization,
            entries,
            collisions,
        }
    }

    /// Normalize raw snapshotter output under `normalization`.
    ///
    /// The same raw path reported twice with the same digest is kept once.
    /// Distinct raw paths that end up with the same identity are kept and
    /// recorded as collisions so that comparing the snapshot reports the
    /// property as incompatible instead of silently dropping a file.
    #[must_use]
    pub fn normalize(
        normalization: NormalizationStrategy,
        root: Option<&Path>,
        raw: impl IntoIterator<Item = RawEntry>,
    ) -> Self {
        let mut seen_raw: HashSet<(PathBuf, FileDigest)> = HashSet::new();
        let mut owners: HashMap<String, PathBuf> = HashMap::new();
        let mut collisions = Vec::new();
        let mut entries = Vec::new();

        for RawEntry { path, digest } in raw {
            if !seen_raw.insert((path.clone(), digest)) {
                continue;
            }

            let identity = normalization.normalize(&path, root);
            if !normalization.ignores_path() {
                match owners.get(&identity) {
                    Some(owner) => {
                        if !collisions.contains(&identity) {
                            warn!(
                                "{} and {} both normalize to '{}' under {} normalization",
                                owner.display(),
                                path.display(),
                                identity,
                                normalization
                            );
                            collisions.push(identity.clone());
                        }
                    }
                    None => {
                        let _ = owners.insert(identity.clone(), path);
                    }
                }
            }
            entries.push(NormalizedEntry { identity, digest });
        }

        Self {
            normalization,
            entries,
            collisions,
        }
    }

    /// Normalization the entries were produced under
    #[must_use]
    pub fn normalization(&self) -> NormalizationStrategy {
        self.normalization
    }

    /// Entries in snapshotter order
    #[must_use]
    pub fn entries(&self) -> &[NormalizedEntry] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities that more than one distinct file normalized to
    #[must_use]
    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    /// Whether the snapshot carries a normalization hazard
    #[must_use]
    pub fn has_collisions(&self) -> bool {
        !self.collisions.is_empty()
    }
}

fn duplicate_identities<'a>(identities: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for identity in identities {
        if !seen.insert(identity) && !duplicates.iter().any(|d| d == identity) {
            duplicates.push(identity.to_string());
        }
    }
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = FileDigest::of(b"int main() {}");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(FileDigest::from_hex(&hex), Some(digest));
        assert_eq!(digest.to_string(), hex[..8]);
    }

    #[test]
    fn test_digest_rejects_bad_hex() {
        assert!(FileDigest::from_hex("abc").is_none());
        assert!(FileDigest::from_hex(&"z".repeat(64)).is_none());
        assert!(FileDigest::from_hex(&"ab".repeat(33)).is_none());
    }

    #[test]
    fn test_digest_accepts_uppercase_hex() {
        let digest = FileDigest::of(b"util");
        let upper = digest.to_hex().to_uppercase();
        assert_eq!(FileDigest::from_hex(&upper), Some(digest));
    }

    #[test]
    fn test_deserialize_recomputes_collisions() {
        let entry = NormalizedEntry::new("config.h", FileDigest::of(b"a"));
        let json = serde_json::json!({
            "normalization": "name_only",
            "entries": [entry.clone(), entry],
        });
        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.collisions(), ["config.h".to_string()]);

        // A stored collision list that disagrees with the entries is ignored
        let tampered = r#"{"normalization":"name_only","entries":[],"collisions":["x"]}"#;
        let snapshot: Snapshot = serde_json::from_str(tampered).unwrap();
        assert!(!snapshot.has_collisions());
    }

    #[test]
    fn test_normalize_relative_entries() {
        let root = Path::new("/build/src");
        let snapshot = Snapshot::normalize(
            NormalizationStrategy::Relative,
            Some(root),
            vec![
                RawEntry::new("/build/src/a/main.c", FileDigest::of(b"main")),
                RawEntry::new("/build/src/b/util.c", FileDigest::of(b"util")),
            ],
        );

        let identities: Vec<_> = snapshot.entries().iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(identities, vec!["a/main.c", "b/util.c"]);
        assert!(!snapshot.has_collisions());
    }

    #[test]
    fn test_normalize_records_name_collisions() {
        let snapshot = Snapshot::normalize(
            NormalizationStrategy::NameOnly,
            None,
            vec![
                RawEntry::new("/x/config.h", FileDigest::of(b"one")),
                RawEntry::new("/y/config.h", FileDigest::of(b"two")),
                RawEntry::new("/z/config.h", FileDigest::of(b"three")),
            ],
        );

        // Nothing is dropped
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.collisions(), ["config.h".to_string()]);
    }

    #[test]
    fn test_normalize_deduplicates_repeated_raw_paths() {
        let digest = FileDigest::of(b"same");
        let snapshot = Snapshot::normalize(
            NormalizationStrategy::NameOnly,
            None,
            vec![
                RawEntry::new("/x/lib.a", digest),
                RawEntry::new("/x/lib.a", digest),
            ],
        );
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.has_collisions());
    }

    #[test]
    fn test_ignored_paths_never_collide() {
        let snapshot = Snapshot::normalize(
            NormalizationStrategy::None,
            None,
            vec![
                RawEntry::new("/a/one.jar", FileDigest::of(b"one")),
                RawEntry::new("/b/two.jar", FileDigest::of(b"two")),
            ],
        );
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.has_collisions());
    }

    #[test]
    fn test_prenormalized_duplicates_are_collisions() {
        let snapshot = Snapshot::new(
            NormalizationStrategy::Relative,
            vec![
                NormalizedEntry::new("a.txt", FileDigest::of(b"1")),
                NormalizedEntry::new("a.txt", FileDigest::of(b"2")),
            ],
        );
        assert_eq!(snapshot.collisions(), ["a.txt".to_string()]);
    }
}
