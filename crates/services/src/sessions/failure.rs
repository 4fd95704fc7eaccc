use std::fmt;

use exam_core::model::SessionId;

use crate::error::ApiError;

/// Which step of the session was running when a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Restore,
    Start,
    Answer,
    Next,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    SessionNotFound,
    InvalidQuestionFormat,
    Network,
    Unauthorized,
    Rejected { status: u16 },
    AlreadyTaken { session_id: SessionId },
}

impl FailureKind {
    /// Permanent failures drop the checkpoint so a reload does not loop on dead state.
    #[must_use]
    pub fn clears_checkpoint(&self) -> bool {
        matches!(
            self,
            FailureKind::SessionNotFound
                | FailureKind::InvalidQuestionFormat
                | FailureKind::AlreadyTaken { .. }
        )
    }

    /// A reload may succeed once the cause goes away.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Network | FailureKind::Unauthorized | FailureKind::Rejected { .. }
        )
    }
}

/// Terminal failure of a session run, as shown to the student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub(crate) fn from_api(err: &ApiError, stage: Stage) -> Self {
        let (kind, message) = match err {
            ApiError::SessionNotFound if stage == Stage::Restore => (
                FailureKind::SessionNotFound,
                "Your session could not be restored.".to_string(),
            ),
            // Only reachable when a finished session is reported by a call that
            // cannot fall back to completion.
            ApiError::SessionNotFound | ApiError::SessionFinished => (
                FailureKind::SessionNotFound,
                "This test session is no longer available.".to_string(),
            ),
            ApiError::InvalidQuestionFormat(_) => (
                FailureKind::InvalidQuestionFormat,
                "The test could not be loaded. Please try again later.".to_string(),
            ),
            ApiError::Network(_) => (
                FailureKind::Network,
                format!(
                    "Connection problem while {}. Reload to continue where you left off.",
                    stage.describe()
                ),
            ),
            ApiError::Unauthorized => (
                FailureKind::Unauthorized,
                "Your login has expired. Please sign in again.".to_string(),
            ),
            ApiError::Rejected { status, detail } => (
                FailureKind::Rejected { status: *status },
                if detail.trim().is_empty() {
                    format!("The server refused the request while {}.", stage.describe())
                } else {
                    detail.clone()
                },
            ),
            ApiError::AlreadyTaken { session_id } => (
                FailureKind::AlreadyTaken {
                    session_id: *session_id,
                },
                "You have already completed this test.".to_string(),
            ),
        };
        Self { kind, message }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Stage {
    fn describe(self) -> &'static str {
        match self {
            Stage::Restore => "restoring the session",
            Stage::Start => "starting the test",
            Stage::Answer => "sending your answer",
            Stage::Next => "loading the next question",
            Stage::Finish => "finishing the test",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_not_found_is_permanent() {
        let failure = Failure::from_api(&ApiError::SessionNotFound, Stage::Restore);
        assert_eq!(failure.kind, FailureKind::SessionNotFound);
        assert_eq!(failure.message, "Your session could not be restored.");
        assert!(failure.kind.clears_checkpoint());
        assert!(!failure.kind.is_transient());
    }

    #[test]
    fn network_keeps_checkpoint() {
        let failure = Failure::from_api(&ApiError::Network("reset".into()), Stage::Answer);
        assert!(!failure.kind.clears_checkpoint());
        assert!(failure.kind.is_transient());
        assert!(failure.message.contains("sending your answer"));
    }

    #[test]
    fn rejected_prefers_server_detail() {
        let failure = Failure::from_api(
            &ApiError::Rejected {
                status: 400,
                detail: "Test has not opened yet".into(),
            },
            Stage::Start,
        );
        assert_eq!(failure.to_string(), "Test has not opened yet");

        let failure = Failure::from_api(
            &ApiError::Rejected {
                status: 500,
                detail: String::new(),
            },
            Stage::Finish,
        );
        assert_eq!(
            failure.message,
            "The server refused the request while finishing the test."
        );
    }

    #[test]
    fn malformed_payload_clears_checkpoint() {
        let failure = Failure::from_api(
            &ApiError::InvalidQuestionFormat("no options".into()),
            Stage::Next,
        );
        assert!(failure.kind.clears_checkpoint());
    }
}
