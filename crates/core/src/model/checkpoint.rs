use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SessionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CheckpointError {
    #[error("malformed checkpoint payload: {0}")]
    Malformed(String),
}

/// Minimal locally persisted state that lets a reloaded client find its session again.
///
/// Stored as JSON text, one record per test id. The server always wins when it
/// disagrees with these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckpoint {
    pub session_id: SessionId,
    pub remaining_seconds: u32,
    pub current_index: u32,
}

impl SessionCheckpoint {
    #[must_use]
    pub fn new(session_id: SessionId, remaining_seconds: u32, current_index: u32) -> Self {
        Self {
            session_id,
            remaining_seconds,
            current_index,
        }
    }

    #[must_use]
    pub fn is_plausible(&self) -> bool {
        self.session_id.is_plausible()
    }

    /// # Errors
    ///
    /// Returns `CheckpointError::Malformed` if serialization fails.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|err| CheckpointError::Malformed(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns `CheckpointError::Malformed` for text that is not a checkpoint record.
    pub fn from_json(raw: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(raw).map_err(|err| CheckpointError::Malformed(err.to_string()))
    }
}
