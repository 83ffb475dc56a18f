use history_core::model::{EventId, QuestionId, UserId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    to_i64("user_id", id.value())
}

pub(crate) fn event_id_to_i64(id: EventId) -> Result<i64, StorageError> {
    to_i64("event_id", id.value())
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    to_i64("question_id", id.value())
}

pub(crate) fn revision_to_i64(revision: u64) -> Result<i64, StorageError> {
    to_i64("revision", revision)
}

pub(crate) fn revision_from_i64(v: i64) -> Result<u64, StorageError> {
    to_u64("revision", v)
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(to_u64("question_id", v)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ids_beyond_i64() {
        assert!(user_id_to_i64(UserId::new(u64::MAX)).is_err());
        assert_eq!(event_id_to_i64(EventId::new(3)).unwrap(), 3);
    }

    #[test]
    fn rejects_negative_revisions() {
        assert!(revision_from_i64(-1).is_err());
        assert_eq!(revision_from_i64(2).unwrap(), 2);
    }
}
