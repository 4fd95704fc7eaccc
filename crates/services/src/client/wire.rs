//! JSON shapes exchanged with the Test Service and their classification.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use exam_core::model::{
    AnswerOption, ExamResult, OptionId, Question, QuestionId, SessionId, TestDefinition, TestId,
    TestListing, TestStatus,
};

use super::{NextQuestion, ResumeResponse, StartResponse};
use crate::error::ApiError;

/// Substring the server puts in `detail` once a session is closed ("finished").
const FINISHED_MARKER: &str = "yakunlangan";
/// Substring the server puts in `detail` for an unknown session id.
const MISSING_SESSION_MARKER: &str = "No TestSession";

#[derive(Debug, Serialize)]
pub(super) struct StartBody {
    pub test_id: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct AnswerBody {
    pub question_id: u64,
    pub selected_option_id: u64,
}

#[derive(Debug, Deserialize)]
struct OptionPayload {
    id: u64,
    #[serde(default)]
    label: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct QuestionPayload {
    id: u64,
    #[serde(default)]
    text: String,
    options: Option<Vec<OptionPayload>>,
}

impl QuestionPayload {
    fn into_question(self) -> Result<Question, ApiError> {
        let Some(options) = self.options else {
            return Err(ApiError::InvalidQuestionFormat(format!(
                "question {} has no options",
                self.id
            )));
        };
        let options = options
            .into_iter()
            .map(|option| AnswerOption {
                id: OptionId::new(option.id),
                label: option.label,
                text: option.text,
            })
            .collect();
        Question::new(QuestionId::new(self.id), self.text, options)
            .map_err(|err| ApiError::InvalidQuestionFormat(err.to_string()))
    }
}

fn question_or_none(payload: Option<QuestionPayload>) -> Result<Option<Question>, ApiError> {
    payload.map(QuestionPayload::into_question).transpose()
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    session_id: u64,
    #[serde(default)]
    duration: u32,
    first_question: Option<QuestionPayload>,
    total_questions: u32,
    #[serde(default)]
    resume: bool,
    #[serde(default = "first_index")]
    current_index: u32,
    remaining_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct ResumePayload {
    total_questions: u32,
    current_question: Option<QuestionPayload>,
    remaining_seconds: u32,
    #[serde(default = "first_index")]
    current_index: u32,
}

#[derive(Debug, Deserialize)]
struct FinishPayload {
    correct_answers: u32,
    total_questions: u32,
    score: f64,
}

#[derive(Debug, Deserialize)]
enum StatusPayload {
    #[serde(rename = "ishlanmagan")]
    NotStarted,
    #[serde(rename = "ishlanmoqda")]
    InProgress,
    #[serde(rename = "ishlangan")]
    Completed,
}

/// Result summary on a test list row. Missing counts read as zero.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListedResultPayload {
    score: f64,
    correct: u32,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct TestPayload {
    id: u64,
    title: String,
    question_count: u32,
    /// Minutes.
    time_limit: u32,
    status: StatusPayload,
    session_id: Option<u64>,
    result: Option<ListedResultPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    session_id: Option<u64>,
}

impl ErrorPayload {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

fn first_index() -> u32 {
    1
}

fn malformed(what: &str, err: &serde_json::Error) -> ApiError {
    ApiError::InvalidQuestionFormat(format!("malformed {what} response: {err}"))
}

pub(super) fn decode_start(body: &str) -> Result<StartResponse, ApiError> {
    let payload: StartPayload = serde_json::from_str(body).map_err(|e| malformed("start", &e))?;
    Ok(StartResponse {
        session_id: SessionId::new(payload.session_id),
        duration_seconds: payload.duration,
        first_question: question_or_none(payload.first_question)?,
        total_questions: payload.total_questions,
        resume: payload.resume,
        current_index: payload.current_index,
        remaining_seconds: payload.remaining_seconds,
    })
}

pub(super) fn decode_resume(body: &str) -> Result<ResumeResponse, ApiError> {
    let payload: ResumePayload =
        serde_json::from_str(body).map_err(|e| malformed("resume", &e))?;
    Ok(ResumeResponse {
        current_question: question_or_none(payload.current_question)?,
        total_questions: payload.total_questions,
        remaining_seconds: payload.remaining_seconds,
        current_index: payload.current_index,
    })
}

pub(super) fn decode_next(body: &str) -> Result<NextQuestion, ApiError> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed("next", &e))?;

    if value.get("options").is_some() {
        let payload: QuestionPayload =
            serde_json::from_value(value).map_err(|e| malformed("next", &e))?;
        return payload.into_question().map(NextQuestion::Question);
    }

    let flagged = value.get("finished").and_then(Value::as_bool) == Some(true);
    let marked = value
        .get("detail")
        .and_then(Value::as_str)
        .is_some_and(|detail| detail.contains(FINISHED_MARKER));
    if flagged || marked {
        return Ok(NextQuestion::ExamComplete);
    }

    Err(ApiError::InvalidQuestionFormat(
        "next response has neither a question nor a completion marker".into(),
    ))
}

pub(super) fn decode_finish(body: &str) -> Result<ExamResult, ApiError> {
    let payload: FinishPayload =
        serde_json::from_str(body).map_err(|e| malformed("finish", &e))?;
    ExamResult::new(payload.correct_answers, payload.total_questions, payload.score)
        .map_err(|err| ApiError::InvalidQuestionFormat(err.to_string()))
}

/// Decode the test list row by row; a row that does not decode is skipped.
pub(super) fn decode_tests(body: &str) -> Result<Vec<TestListing>, ApiError> {
    let rows: Vec<Value> = serde_json::from_str(body).map_err(|e| malformed("test list", &e))?;

    let listings = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<TestPayload>(row) {
            Ok(test) => Some(listing_from(test)),
            Err(err) => {
                warn!(error = %err, "skipping unreadable test list row");
                None
            }
        })
        .collect();
    Ok(listings)
}

fn listing_from(test: TestPayload) -> TestListing {
    let test_id = TestId::new(test.id);
    let result = test.result.and_then(|r| {
        ExamResult::new(r.correct, r.total, r.score)
            .map_err(|err| warn!(%test_id, error = %err, "dropping inconsistent listed result"))
            .ok()
    });
    TestListing {
        definition: TestDefinition {
            id: test_id,
            title: test.title,
            total_questions: test.question_count,
            time_limit_secs: test.time_limit.saturating_mul(60),
        },
        status: match test.status {
            StatusPayload::NotStarted => TestStatus::NotStarted,
            StatusPayload::InProgress => TestStatus::InProgress,
            StatusPayload::Completed => TestStatus::Completed,
        },
        session_id: test.session_id.map(SessionId::new),
        result,
    }
}

/// Map a non-success response onto the error taxonomy.
pub(super) fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }

    let detail = ErrorPayload::parse(body).detail.unwrap_or_default();
    if detail.contains(MISSING_SESSION_MARKER) {
        return ApiError::SessionNotFound;
    }
    if detail.contains(FINISHED_MARKER) {
        return ApiError::SessionFinished;
    }

    match status {
        StatusCode::NOT_FOUND => ApiError::SessionNotFound,
        StatusCode::CONFLICT | StatusCode::GONE => ApiError::SessionFinished,
        _ => ApiError::Rejected {
            status: status.as_u16(),
            detail,
        },
    }
}

/// `start` rejects with the finished session's id when the test was already taken.
pub(super) fn classify_start_failure(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    match ErrorPayload::parse(body).session_id {
        Some(id) => ApiError::AlreadyTaken {
            session_id: SessionId::new(id),
        },
        None => classify_failure(status, body),
    }
}
