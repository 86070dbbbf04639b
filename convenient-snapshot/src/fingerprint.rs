//! Stable fingerprint of a unit's observed state
//!
//! Two units with the same implementation and the same property snapshots
//! get the same fingerprint regardless of declaration order or the order the
//! snapshotter listed unordered files in. A distributed cache can key stored
//! results by it.

use crate::compare::CompareStrategy;
use crate::engine::UnitOfWork;
use crate::snapshot::NormalizedEntry;
use crate::state::{CurrentSnapshots, Observation};
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 hex fingerprint of `unit` and its current snapshots.
///
/// Properties are hashed in name order. Unresolved properties hash as
/// absent. Returns `None` if any snapshot is incomplete, since a partial
/// snapshot cannot identify the state it was taken from.
#[must_use]
pub fn fingerprint(unit: &UnitOfWork, current: &CurrentSnapshots) -> Option<String> {
    let mut hasher = Sha256::new();

    field(&mut hasher, unit.identity().as_bytes());
    match unit.implementation() {
        Some(implementation) => {
            hasher.update([1u8]);
            field(&mut hasher, implementation.as_bytes());
        }
        None => hasher.update([0u8]),
    }

    let specs = unit.properties().sorted_by_name();
    count(&mut hasher, specs.len());
    for spec in specs {
        field(&mut hasher, spec.role().to_string().as_bytes());
        field(&mut hasher, spec.name().as_bytes());
        field(&mut hasher, spec.normalization().to_string().as_bytes());

        match current.get(spec.role(), spec.name()) {
            Observation::Captured(snapshot) => {
                let mut entries: Vec<&NormalizedEntry> = snapshot.entries().iter().collect();
                if spec.compare_strategy() == CompareStrategy::Unordered {
                    entries.sort_by(|a, b| {
                        a.identity.cmp(&b.identity).then(a.digest.cmp(&b.digest))
                    });
                }
                hasher.update([1u8]);
                count(&mut hasher, entries.len());
                for entry in entries {
                    field(&mut hasher, entry.identity.as_bytes());
                    hasher.update(entry.digest.as_bytes());
                }
            }
            Observation::Unresolved => hasher.update([0u8]),
            Observation::Incomplete(_) => {
                debug!("No fingerprint for {}: {} is incomplete", unit.identity(), spec);
                return None;
            }
        }
    }

    Some(format!("{:x}", hasher.finalize()))
}

/// Length-prefixed so that no two field sequences hash the same bytes
fn field(hasher: &mut Sha256, bytes: &[u8]) {
    count(hasher, bytes.len());
    hasher.update(bytes);
}

fn count(hasher: &mut Sha256, n: usize) {
    hasher.update((n as u64).to_le_bytes());
}
