mod ids;
mod media;
mod policy;
mod progress;
mod question;

pub use ids::{EventId, ParseIdError, QuestionId, UserId};
pub use media::{MediaError, MediaUri, QuestionMedia};
pub use policy::{CreditsOnLock, PolicyError, QuizPolicy, QuizPolicyDraft};
pub use progress::{
    AttemptDraft, AttemptRecord, ProgressPatch, ProgressRecord, ProgressRecordError,
};
pub use question::{QuestionBank, QuestionError, QuizQuestion, QuizQuestionDraft};
