//! Test Service contract and its HTTP implementation.

mod http;
mod wire;

use async_trait::async_trait;

use exam_core::model::{Answer, ExamResult, Question, SessionId, TestId, TestListing};

use crate::error::ApiError;

pub use http::{ApiConfig, HttpTestClient};

/// Outcome of `start`.
///
/// `resume == true` means the server handed back an already active session
/// instead of creating a new one; callers treat it exactly like a `resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResponse {
    pub session_id: SessionId,
    pub duration_seconds: u32,
    pub first_question: Option<Question>,
    pub total_questions: u32,
    pub resume: bool,
    pub current_index: u32,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeResponse {
    pub current_question: Option<Question>,
    pub total_questions: u32,
    pub remaining_seconds: u32,
    pub current_index: u32,
}

/// Result of asking for the next question. Running out of questions is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestion {
    Question(Question),
    ExamComplete,
}

/// The session operations of the Test Service.
///
/// Every call is one round-trip; implementations never retry.
#[async_trait]
pub trait TestApi: Send + Sync {
    /// # Errors
    ///
    /// `ApiError::AlreadyTaken` if the student already completed this test.
    async fn start(&self, test_id: TestId) -> Result<StartResponse, ApiError>;

    /// # Errors
    ///
    /// `ApiError::SessionNotFound` if the id is unknown, expired, or finished.
    async fn resume(&self, session_id: SessionId) -> Result<ResumeResponse, ApiError>;

    /// # Errors
    ///
    /// `ApiError::SessionFinished` if the session closed since the question was issued.
    async fn submit_answer(&self, session_id: SessionId, answer: Answer) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// `ApiError::InvalidQuestionFormat` for a malformed question payload.
    async fn next_question(&self, session_id: SessionId) -> Result<NextQuestion, ApiError>;

    /// # Errors
    ///
    /// `ApiError::SessionFinished` if the session was already finished.
    async fn finish(&self, session_id: SessionId) -> Result<ExamResult, ApiError>;

    /// The student's test list, including per-test status and results.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport or payload failures.
    async fn list_tests(&self) -> Result<Vec<TestListing>, ApiError>;
}
