use std::collections::HashSet;

use thiserror::Error;

use crate::model::{OptionId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {question_id} has no options")]
    NoOptions { question_id: QuestionId },

    #[error("question {question_id} lists option {option_id} more than once")]
    DuplicateOption {
        question_id: QuestionId,
        option_id: OptionId,
    },

    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption {
        question_id: QuestionId,
        option_id: OptionId,
    },
}

/// One selectable choice of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: OptionId,
    /// Short marker shown before the text, e.g. `A`.
    pub label: String,
    pub text: String,
}

/// A multiple-choice question as delivered by the server, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<AnswerOption>,
}

impl Question {
    /// Build a question, keeping option order as delivered.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NoOptions` for an empty option list and
    /// `QuestionError::DuplicateOption` when an option id repeats.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        if options.is_empty() {
            return Err(QuestionError::NoOptions { question_id: id });
        }

        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(option.id) {
                return Err(QuestionError::DuplicateOption {
                    question_id: id,
                    option_id: option.id,
                });
            }
        }

        Ok(Self {
            id,
            text: text.into(),
            options,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|option| option.id == id)
    }

    /// Pair this question with one of its options.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::UnknownOption` if `option_id` is not listed.
    pub fn answer(&self, option_id: OptionId) -> Result<Answer, QuestionError> {
        if self.option(option_id).is_none() {
            return Err(QuestionError::UnknownOption {
                question_id: self.id,
                option_id,
            });
        }
        Ok(Answer {
            question_id: self.id,
            option_id,
        })
    }
}

/// A selection ready to be submitted. Not persisted once sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    pub question_id: QuestionId,
    pub option_id: OptionId,
}
