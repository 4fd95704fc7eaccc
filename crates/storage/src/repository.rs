use async_trait::async_trait;
use exam_core::model::{SessionCheckpoint, TestId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable per-test slot holding the latest settled session checkpoint.
///
/// There is exactly one writer per test id (the active exam), so
/// implementations need no cross-writer coordination.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch the checkpoint saved for a test, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored record cannot be
    /// decoded, or other storage errors.
    async fn load(&self, test_id: TestId) -> Result<Option<SessionCheckpoint>, StorageError>;

    /// Create or overwrite the checkpoint for a test. Completes only once the
    /// record is durable.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the checkpoint cannot be stored.
    async fn save(&self, test_id: TestId, checkpoint: &SessionCheckpoint)
    -> Result<(), StorageError>;

    /// Remove the checkpoint for a test. Clearing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be removed.
    async fn clear(&self, test_id: TestId) -> Result<(), StorageError>;
}

/// Checkpoint store that keeps the JSON text in memory, for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    slots: Arc<Mutex<HashMap<TestId, String>>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under a test id, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw(&self, test_id: TestId, raw: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(test_id, raw.into());
        Ok(())
    }

    /// Raw stored text for a test id, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn raw(&self, test_id: TestId) -> Result<Option<String>, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&test_id).cloned())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, test_id: TestId) -> Result<Option<SessionCheckpoint>, StorageError> {
        let Some(raw) = self.raw(test_id)? else {
            return Ok(None);
        };
        SessionCheckpoint::from_json(&raw)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn save(
        &self,
        test_id: TestId,
        checkpoint: &SessionCheckpoint,
    ) -> Result<(), StorageError> {
        let raw = checkpoint
            .to_json()
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.put_raw(test_id, raw)
    }

    async fn clear(&self, test_id: TestId) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&test_id);
        Ok(())
    }
}

/// Aggregates storage behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub checkpoints: Arc<dyn CheckpointStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        }
    }
}
