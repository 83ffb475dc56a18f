//! Shared error types for the services crate.

use thiserror::Error;

use history_core::gate::LaunchStatus;
use history_core::model::{EventId, ProgressRecordError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressStore` and the policies built on it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress for event {event_id} kept changing; gave up after {tries} tries")]
    Contended { event_id: EventId, tries: u32 },
    #[error(transparent)]
    Record(#[from] ProgressRecordError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizSession` construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,
}

/// Errors emitted by `QuizLoopService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz cannot start: {0:?}")]
    Blocked(LaunchStatus),
    #[error("quiz session is not complete")]
    NotComplete,
    #[error("quiz session outcome was already recorded")]
    AlreadyRecorded,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `PurchaseBridge`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PurchaseError {
    #[error("attempt pack quantity must be > 0")]
    InvalidQuantity,
    #[error("attempt packs are not offered")]
    Disabled,
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Errors emitted while bootstrapping engine services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
