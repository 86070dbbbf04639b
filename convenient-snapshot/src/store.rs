//! Prior-run snapshot storage
//!
//! The store is the only state shared between units of work. It is read
//! once per unit before detection and written once per unit after
//! execution. Entries are keyed by unit identity, so concurrent detection
//! of different units never touches the same entry.

use crate::error::{SnapshotError, SnapshotResult};
use crate::state::UnitHistory;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Keyed storage of each unit's last committed history
pub trait SnapshotStore: Send + Sync {
    /// History committed for `unit`, if any
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the backing storage fails.
    fn load(&self, unit: &str) -> SnapshotResult<Option<Arc<UnitHistory>>>;

    /// Replace the history of `unit`
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the backing storage fails.
    fn commit(&self, unit: &str, history: UnitHistory) -> SnapshotResult<()>;
}

/// In-process store, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    inner: Arc<RwLock<HashMap<String, Arc<UnitHistory>>>>,
}

impl InMemorySnapshotStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units with a committed history
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the lock is poisoned.
    pub fn len(&self) -> SnapshotResult<usize> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.len())
    }

    /// Whether no unit has a committed history
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the lock is poisoned.
    pub fn is_empty(&self) -> SnapshotResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Forget the history of `unit`, forcing its next run
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Store` if the lock is poisoned.
    pub fn invalidate(&self, unit: &str) -> SnapshotResult<bool> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        Ok(inner.remove(unit).is_some())
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, unit: &str) -> SnapshotResult<Option<Arc<UnitHistory>>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.get(unit).cloned())
    }

    fn commit(&self, unit: &str, history: UnitHistory) -> SnapshotResult<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let _ = inner.insert(unit.to_string(), Arc::new(history));
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SnapshotError {
    SnapshotError::Store("snapshot store lock poisoned".to_string())
}
