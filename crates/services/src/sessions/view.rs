use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use exam_core::model::{ExamResult, OptionId, Question, SessionId};
use exam_core::time::{format_remaining, is_low_time};

use super::failure::{Failure, FailureKind};

/// How long a finished or dead exam stays on screen before returning to the list.
pub const REDIRECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    AwaitingAnswer,
    Submitting,
    /// The server has no more questions; finishing follows immediately.
    ExamComplete,
    Finishing,
    Finished,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Failed)
    }

    /// `finish` has been issued (or completed) for this run.
    #[must_use]
    pub fn is_finishing(self) -> bool {
        matches!(self, Phase::Finishing | Phase::Finished)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Initializing => "initializing",
            Phase::AwaitingAnswer => "awaiting an answer",
            Phase::Submitting => "submitting",
            Phase::ExamComplete => "exam complete",
            Phase::Finishing => "finishing",
            Phase::Finished => "finished",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What the student asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIntent {
    Select(OptionId),
    Submit,
    RequestFinish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The server reported no questions left.
    AllAnswered,
    UserRequested,
    TimeExpired,
    /// The server had already closed the session.
    AlreadyClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// `None` when the session was closed elsewhere and no result could be found.
    pub result: Option<ExamResult>,
    pub reason: FinishReason,
    pub finished_at: DateTime<Utc>,
}

impl Completion {
    #[must_use]
    pub fn summary_line(&self) -> String {
        match self.result {
            Some(result) => format!(
                "Test finished! You answered {}/{} questions correctly. Score: {}%",
                result.correct_answers(),
                result.total_questions(),
                result.score()
            ),
            None => "Test finished. Your result will appear in the test list.".to_string(),
        }
    }
}

/// Where the shell should navigate once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    ToTestList { after: Duration },
    ToResult { session_id: SessionId },
    ToLogin,
}

impl Redirect {
    pub(crate) fn for_failure(kind: &FailureKind) -> Option<Self> {
        match kind {
            FailureKind::AlreadyTaken { session_id } => Some(Redirect::ToResult {
                session_id: *session_id,
            }),
            FailureKind::Unauthorized => Some(Redirect::ToLogin),
            FailureKind::SessionNotFound | FailureKind::InvalidQuestionFormat => {
                Some(Redirect::ToTestList {
                    after: REDIRECT_DELAY,
                })
            }
            FailureKind::Network | FailureKind::Rejected { .. } => None,
        }
    }
}

/// Snapshot handed to the presentation layer on every state change.
///
/// Carries data, not markup; the helpers only cover the small formatting the
/// exam screen always needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: Phase,
    pub session_id: Option<SessionId>,
    pub question: Option<Question>,
    pub selected: Option<OptionId>,
    pub current_index: u32,
    pub total_questions: u32,
    pub remaining_seconds: u32,
    pub completion: Option<Completion>,
    pub failure: Option<Failure>,
    pub redirect: Option<Redirect>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            phase: Phase::Uninitialized,
            session_id: None,
            question: None,
            selected: None,
            current_index: 1,
            total_questions: 0,
            remaining_seconds: 0,
            completion: None,
            failure: None,
            redirect: None,
        }
    }
}

impl SessionView {
    #[must_use]
    pub fn remaining_label(&self) -> String {
        format_remaining(self.remaining_seconds)
    }

    #[must_use]
    pub fn is_low_time(&self) -> bool {
        self.phase == Phase::AwaitingAnswer && is_low_time(self.remaining_seconds)
    }

    #[must_use]
    pub fn progress_label(&self) -> String {
        format!("Question {} / {}", self.current_index, self.total_questions)
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index >= self.total_questions
    }

    #[must_use]
    pub fn submit_label(&self) -> &'static str {
        if self.is_last_question() { "Finish" } else { "Next" }
    }

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.phase == Phase::AwaitingAnswer && self.selected.is_some()
    }
}
