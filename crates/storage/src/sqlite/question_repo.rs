use async_trait::async_trait;
use chrono::Utc;
use history_core::model::{EventId, QuizQuestion};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, event_id_to_i64, question_id_from_i64, question_id_to_i64, ser};
use crate::repository::{QuestionBankRepository, StorageError};

#[async_trait]
impl QuestionBankRepository for SqliteRepository {
    async fn fetch_bank(&self, event_id: EventId) -> Result<Vec<QuizQuestion>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, payload
                FROM questions
                WHERE event_id = ?1
                ORDER BY id ASC
            ",
        )
        .bind(event_id_to_i64(event_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let payload: String = row.try_get("payload").map_err(ser)?;
            // A broken question must not take the whole quiz down with it.
            match serde_json::from_str::<QuizQuestion>(&payload) {
                Ok(question) if question.id() == id => out.push(question),
                Ok(question) => tracing::warn!(
                    event = %event_id,
                    row_id = %id,
                    payload_id = %question.id(),
                    "question payload id mismatch; skipping"
                ),
                Err(err) => tracing::warn!(
                    event = %event_id,
                    question = %id,
                    error = %err,
                    "malformed question payload; skipping"
                ),
            }
        }
        Ok(out)
    }

    async fn upsert_question(
        &self,
        event_id: EventId,
        question: &QuizQuestion,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(question).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO questions (event_id, id, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(event_id, id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(event_id_to_i64(event_id)?)
        .bind(question_id_to_i64(question.id())?)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
