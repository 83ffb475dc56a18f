use async_trait::async_trait;
use chrono::Utc;
use history_core::model::{EventId, ProgressRecord, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, event_id_to_i64, revision_from_i64, revision_to_i64, ser, user_id_to_i64,
};
use crate::repository::{ProgressRepository, StorageError, encode_progress, progress_from_row};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload, revision
                FROM progress
                WHERE user_id = ?1 AND event_id = ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(event_id_to_i64(event_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.try_get("payload").map_err(ser)?;
        let revision = revision_from_i64(row.try_get::<i64, _>("revision").map_err(ser)?)?;
        Ok(Some(progress_from_row(user_id, event_id, &payload, revision)))
    }

    async fn save_progress(
        &self,
        user_id: UserId,
        record: &ProgressRecord,
    ) -> Result<u64, StorageError> {
        let payload = encode_progress(record)?;
        let user = user_id_to_i64(user_id)?;
        let event = event_id_to_i64(record.event_id())?;
        let expected = record.revision();
        let next = expected
            .checked_add(1)
            .ok_or_else(|| StorageError::Serialization("revision overflow".into()))?;

        let result = if expected == 0 {
            sqlx::query(
                r"
                    INSERT INTO progress (user_id, event_id, payload, revision, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(user_id, event_id) DO NOTHING
                ",
            )
            .bind(user)
            .bind(event)
            .bind(&payload)
            .bind(revision_to_i64(next)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r"
                    UPDATE progress
                    SET payload = ?3, revision = ?4, updated_at = ?5
                    WHERE user_id = ?1 AND event_id = ?2 AND revision = ?6
                ",
            )
            .bind(user)
            .bind(event)
            .bind(&payload)
            .bind(revision_to_i64(next)?)
            .bind(Utc::now())
            .bind(revision_to_i64(expected)?)
            .execute(&self.pool)
            .await
        };
        let res = result.map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(next)
    }
}
