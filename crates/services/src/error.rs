//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{QuestionError, SessionId};

use crate::sessions::Phase;

/// Failures of a single Test Service call, classified for the lifecycle manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiError {
    /// Session id unknown, expired, or already closed on the server.
    #[error("test session not found")]
    SessionNotFound,
    /// The session was completed (by timeout or otherwise) before this call.
    #[error("test session already finished")]
    SessionFinished,
    #[error("invalid question format: {0}")]
    InvalidQuestionFormat(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("request rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    /// `start` refused because this student already completed the test.
    #[error("test already taken in session {session_id}")]
    AlreadyTaken { session_id: SessionId },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors in building the HTTP client configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API base url {raw:?}: {source}")]
    InvalidBaseUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("API base url must use http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// A user intent that the manager refused without side effects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntentError {
    #[error("session manager was disposed")]
    Disposed,
    #[error("cannot {action} while {phase}")]
    WrongPhase { action: &'static str, phase: Phase },
    #[error("no option selected")]
    NoSelection,
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error("the last failure cannot be retried")]
    NotRetryable,
}
