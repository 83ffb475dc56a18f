mod bank;
mod session;
mod workflow;

// Public API of the quiz subsystem.
pub use crate::error::{QuizError, SessionError};
pub use bank::QuestionBankSelector;
pub use session::{AnswerRecord, QuizPhase, QuizSession, QuizSummary, SessionEvent, SessionTiming};
pub use workflow::{QuizLoopService, QuizStart};
