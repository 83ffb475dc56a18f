use thiserror::Error;

use crate::grading::StarTableError;
use crate::model::{MediaError, PolicyError, ProgressRecordError, QuestionError};
use crate::sequencing::CurriculumError;

/// Umbrella over the domain validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Stars(#[from] StarTableError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Progress(#[from] ProgressRecordError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
}
