use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::repository::{CheckpointStore, StorageError};
use exam_core::model::{SessionCheckpoint, TestId};

use super::SqliteRepository;

fn test_id_to_i64(test_id: TestId) -> Result<i64, StorageError> {
    i64::try_from(test_id.value())
        .map_err(|_| StorageError::Serialization(format!("test id {test_id} out of range")))
}

#[async_trait]
impl CheckpointStore for SqliteRepository {
    async fn load(&self, test_id: TestId) -> Result<Option<SessionCheckpoint>, StorageError> {
        let row = sqlx::query("SELECT payload FROM checkpoints WHERE test_id = ?1")
            .bind(test_id_to_i64(test_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row
            .try_get("payload")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        SessionCheckpoint::from_json(&payload)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn save(
        &self,
        test_id: TestId,
        checkpoint: &SessionCheckpoint,
    ) -> Result<(), StorageError> {
        let payload = checkpoint
            .to_json()
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO checkpoints (test_id, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(test_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(test_id_to_i64(test_id)?)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        debug!(test_id = %test_id, %payload, "checkpoint saved");
        Ok(())
    }

    async fn clear(&self, test_id: TestId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE test_id = ?1")
            .bind(test_id_to_i64(test_id)?)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        debug!(test_id = %test_id, removed = result.rows_affected(), "checkpoint cleared");
        Ok(())
    }
}
