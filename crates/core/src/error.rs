use thiserror::Error;

use crate::model::{CheckpointError, QuestionError, ResultError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
