use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::model::ids::{EventId, QuestionId};
use crate::model::media::QuestionMedia;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("a question needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("option {0} is empty")]
    EmptyOption(usize),

    #[error("answer index {index} is out of range for {len} options")]
    AnswerOutOfRange { index: usize, len: usize },

    #[error("time per question must be > 0 seconds")]
    InvalidTimePerQuestion,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question from an event's bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuizQuestionDraft", into = "QuizQuestionDraft")]
pub struct QuizQuestion {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    answer_index: usize,
    explanation: String,
    media: Option<QuestionMedia>,
    time_per_question_secs: Option<u32>,
}

/// Unvalidated wire shape of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestionDraft {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<QuestionMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_per_question_secs: Option<u32>,
}

impl QuizQuestionDraft {
    /// Validate and trim the draft into a usable question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt or any option is blank, fewer
    /// than two options are given, the answer index is out of range, or a
    /// zero per-question time is supplied.
    pub fn validate(self) -> Result<QuizQuestion, QuestionError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.options.len() < 2 {
            return Err(QuestionError::TooFewOptions(self.options.len()));
        }
        let mut options = Vec::with_capacity(self.options.len());
        for (idx, option) in self.options.into_iter().enumerate() {
            let option = option.trim().to_string();
            if option.is_empty() {
                return Err(QuestionError::EmptyOption(idx));
            }
            options.push(option);
        }
        if self.answer_index >= options.len() {
            return Err(QuestionError::AnswerOutOfRange {
                index: self.answer_index,
                len: options.len(),
            });
        }
        if self.time_per_question_secs == Some(0) {
            return Err(QuestionError::InvalidTimePerQuestion);
        }

        Ok(QuizQuestion {
            id: self.id,
            prompt,
            options,
            answer_index: self.answer_index,
            explanation: self.explanation.trim().to_string(),
            media: self.media,
            time_per_question_secs: self.time_per_question_secs,
        })
    }
}

impl TryFrom<QuizQuestionDraft> for QuizQuestion {
    type Error = QuestionError;

    fn try_from(draft: QuizQuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<QuizQuestion> for QuizQuestionDraft {
    fn from(q: QuizQuestion) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt,
            options: q.options,
            answer_index: q.answer_index,
            explanation: q.explanation,
            media: q.media,
            time_per_question_secs: q.time_per_question_secs,
        }
    }
}

impl QuizQuestion {
    /// Build a text-only question.
    ///
    /// # Errors
    ///
    /// See [`QuizQuestionDraft::validate`].
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        answer_index: usize,
        explanation: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        QuizQuestionDraft {
            id,
            prompt: prompt.into(),
            options,
            answer_index,
            explanation: explanation.into(),
            media: None,
            time_per_question_secs: None,
        }
        .validate()
    }

    #[must_use]
    pub fn with_media(mut self, media: QuestionMedia) -> Self {
        self.media = Some(media);
        self
    }

    /// Override the time this question contributes to the session countdown.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidTimePerQuestion` for zero.
    pub fn with_time_per_question(mut self, secs: u32) -> Result<Self, QuestionError> {
        if secs == 0 {
            return Err(QuestionError::InvalidTimePerQuestion);
        }
        self.time_per_question_secs = Some(secs);
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer_index(&self) -> usize {
        self.answer_index
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn media(&self) -> Option<&QuestionMedia> {
        self.media.as_ref()
    }

    #[must_use]
    pub fn time_per_question_secs(&self) -> Option<u32> {
        self.time_per_question_secs
    }

    #[must_use]
    pub fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.answer_index
    }
}

//
// ─── BANK SNAPSHOT ─────────────────────────────────────────────────────────────
//

/// Immutable snapshot of an event's question pool.
///
/// Cloning is cheap; edits to the stored bank after the snapshot was taken
/// never reach a session built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBank {
    event_id: EventId,
    questions: Arc<[QuizQuestion]>,
}

impl QuestionBank {
    #[must_use]
    pub fn new(event_id: EventId, questions: Vec<QuizQuestion>) -> Self {
        Self {
            event_id,
            questions: questions.into(),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// An empty bank means no quiz is configured for the event yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
