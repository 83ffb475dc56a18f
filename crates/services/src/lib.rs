#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempts;
pub mod curriculum;
pub mod error;
pub mod progress_store;
pub mod purchase;
pub mod quiz;
pub mod reading;

pub use history_core::Clock;

pub use app_services::AppServices;
pub use attempts::{AttemptLockoutService, AttemptOutcome};
pub use curriculum::{CurriculumService, EventAccess};
pub use error::{AppServicesError, ProgressError, PurchaseError, QuizError, SessionError};
pub use progress_store::ProgressStore;
pub use purchase::{AttemptPackPurchased, PurchaseApplied, PurchaseBridge};
pub use quiz::{
    AnswerRecord, QuestionBankSelector, QuizLoopService, QuizPhase, QuizSession, QuizStart,
    QuizSummary, SessionEvent, SessionTiming,
};
pub use reading::{ReadingTracker, scroll_ratio};
