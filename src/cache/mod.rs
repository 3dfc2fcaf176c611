//! Per operation cache of the events found in worker container logs.
//!
//! Values are immutable snapshots. A miss loads the whole history, a stale
//! hit reads only what was logged since the previous read and publishes a
//! new snapshot. Every key has its own slot so loads and reloads of one
//! operation never hold up another.

mod loader;
mod value;

pub use loader::EventsLoader;
pub use value::{CacheValue, OperationKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::directory::{Directory, DirectoryError};
use crate::errors::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Deployment with id {0} does not exist")]
    NotFound(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl CacheError {
    /// An equivalent error of the same kind for another caller.
    fn duplicate(&self) -> Self {
        match self {
            Self::NotFound(key) => Self::NotFound(key.clone()),
            Self::Directory(DirectoryError::MissingProperty { process, property }) => {
                Self::Directory(DirectoryError::MissingProperty {
                    process: process.clone(),
                    property: *property,
                })
            }
            Self::Directory(e) => Self::Directory(DirectoryError::Unavailable(e.to_string())),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Directory(e) => e.kind(),
        }
    }
}

#[derive(Default)]
struct Slot {
    current: RwLock<Option<Arc<CacheValue>>>,
    /// Held for the whole initial load. Keeps the failure of the latest
    /// attempt for the callers that queued behind it.
    loading: tokio::sync::Mutex<Option<CacheError>>,
    load_attempts: AtomicU64,
    reloading: AtomicBool,
}

impl Slot {
    fn snapshot(&self) -> Option<Arc<CacheValue>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, value: Arc<CacheValue>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

/// Clears the reload flag of a slot when dropped, also when the reloading
/// future is cancelled.
struct ReloadGuard<'a> {
    slot: &'a Slot,
}

impl<'a> ReloadGuard<'a> {
    fn acquire(slot: &'a Slot) -> Option<Self> {
        slot.reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot })
    }
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.slot.reloading.store(false, Ordering::Release);
    }
}

pub struct DeploymentEventCache {
    loader: EventsLoader,
    refresh_after: Duration,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl DeploymentEventCache {
    pub fn new(
        directory: Arc<dyn Directory>,
        event_logger: &str,
        refresh_after: Duration,
    ) -> Self {
        Self {
            loader: EventsLoader::new(directory, event_logger),
            refresh_after,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Drops the slot of `key` when it never got a value and nobody else
    /// is using it.
    fn release(&self, key: &str, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference is the map's, the other is ours.
        if Arc::strong_count(slot) > 2 || slot.snapshot().is_some() {
            return;
        }
        if slots.get(key).is_some_and(|held| Arc::ptr_eq(held, slot)) {
            slots.remove(key);
        }
    }

    /// Current events of the operation `key`.
    ///
    /// Loads on a miss. A stale value is refreshed unless another caller is
    /// already doing so, in which case the previous snapshot is returned.
    pub async fn get(&self, key: &str) -> Result<Arc<CacheValue>, CacheError> {
        let slot = self.slot(key);

        let Some(current) = slot.snapshot() else {
            let loaded = self.load(key, &slot).await;
            if loaded.is_err() {
                self.release(key, &slot);
            }
            return loaded;
        };

        if !self.refresh_due(&current) {
            return Ok(current);
        }
        let Some(_reloading) = ReloadGuard::acquire(&slot) else {
            return Ok(current);
        };

        // A reload may have finished between the snapshot and the flag.
        let current = slot.snapshot().unwrap_or(current);
        if !self.refresh_due(&current) {
            return Ok(current);
        }

        match self.loader.reload(key, &current).await {
            Ok(Some(next)) => {
                let next = Arc::new(next);
                slot.publish(next.clone());
                Ok(next)
            }
            Ok(None) => Ok(current),
            Err(e) => {
                log::warn!("Failed to reload events of {key}: {e}");
                Err(e)
            }
        }
    }

    async fn load(&self, key: &str, slot: &Slot) -> Result<Arc<CacheValue>, CacheError> {
        let attempt = slot.load_attempts.load(Ordering::Acquire);
        let mut last_failure = slot.loading.lock().await;
        if let Some(current) = slot.snapshot() {
            return Ok(current);
        }
        // The load this caller queued behind has failed already.
        if slot.load_attempts.load(Ordering::Acquire) != attempt {
            if let Some(failure) = last_failure.as_ref() {
                return Err(failure.duplicate());
            }
        }

        let loaded = self.loader.load(key).await;
        slot.load_attempts.fetch_add(1, Ordering::AcqRel);
        match loaded {
            Ok(value) => {
                *last_failure = None;
                let value = Arc::new(value);
                slot.publish(value.clone());
                Ok(value)
            }
            Err(e) => {
                *last_failure = Some(e.duplicate());
                Err(e)
            }
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn refresh_due(&self, value: &CacheValue) -> bool {
        value.last_refreshed_at.elapsed() >= self.refresh_after
    }
}
