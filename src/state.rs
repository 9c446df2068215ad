use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::clean::Transformation;
use crate::data::model::Dataset;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The raw/cleaned dataset pair plus the cleaning history.
#[derive(Debug, Clone, Default)]
struct Session {
    raw: Option<Arc<Dataset>>,
    cleaned: Option<Arc<Dataset>>,
    history: Vec<Transformation>,
}

impl Session {
    fn active(&self) -> Option<&Arc<Dataset>> {
        self.cleaned.as_ref().or(self.raw.as_ref())
    }
}

/// A consistent view of the store at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: Arc<Dataset>,
    pub history: Vec<Transformation>,
}

/// Session-scoped dataset store.
///
/// Writers take the lock exclusively and swap whole `Arc<Dataset>` values, so
/// readers see either the previous or the next dataset, never a mix. Readers
/// clone the `Arc` and release the lock before doing any work.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Session>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single assignment, so a poisoned lock still guards a
    // committed state and can be used.
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the raw dataset; the cleaned dataset and history are discarded.
    pub fn set_raw(&self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        let mut session = self.write();
        *session = Session {
            raw: Some(Arc::clone(&dataset)),
            cleaned: None,
            history: Vec::new(),
        };
        dataset
    }

    /// Replace the cleaned dataset.
    pub fn set_cleaned(&self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        self.write().cleaned = Some(Arc::clone(&dataset));
        dataset
    }

    /// Cleaned dataset if present, else raw.
    pub fn active(&self) -> Result<Arc<Dataset>> {
        self.read().active().cloned().ok_or(EngineError::NoDataLoaded)
    }

    /// Derive a new cleaned dataset from the active one and commit it.
    ///
    /// The write lock is held across `f`, so concurrent derivations apply one
    /// after the other instead of both starting from the same base.
    pub fn derive<F>(&self, f: F) -> Result<Snapshot>
    where
        F: FnOnce(&Dataset) -> Result<(Dataset, Vec<Transformation>)>,
    {
        let mut session = self.write();
        let base = session.active().cloned().ok_or(EngineError::NoDataLoaded)?;
        let (next, steps) = f(&base)?;

        let next = Arc::new(next);
        session.cleaned = Some(Arc::clone(&next));
        session.history.extend(steps);
        Ok(Snapshot {
            dataset: next,
            history: session.history.clone(),
        })
    }

    /// Drop the cleaned dataset and history so the raw dataset is active again.
    pub fn reset_to_raw(&self) -> Result<Arc<Dataset>> {
        let mut session = self.write();
        let raw = session.raw.clone().ok_or(EngineError::NoDataLoaded)?;
        session.cleaned = None;
        session.history.clear();
        Ok(raw)
    }

    /// Empty both slots.
    pub fn clear(&self) {
        *self.write() = Session::default();
    }

    pub fn has_cleaned(&self) -> bool {
        self.read().cleaned.is_some()
    }
}
