use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use exam_core::model::{
    Answer, AnswerOption, ExamResult, OptionId, Question, QuestionId, SessionCheckpoint,
    SessionId, TestDefinition, TestId, TestListing, TestStatus,
};
use exam_core::time::fixed_clock;
use services::{
    ApiError, DisposeHandle, FailureKind, FinishReason, IntentError, NextQuestion, Phase,
    Redirect, ResumeResponse, SessionManager, StartResponse, TestApi,
};
use storage::repository::{CheckpointStore, InMemoryCheckpointStore, StorageError};

const TEST: TestId = TestId::new(1);
const SESSION: SessionId = SessionId::new(7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Start(TestId),
    Resume(SessionId),
    Answer(Answer),
    Next(SessionId),
    Finish(SessionId),
    ListTests,
}

impl Call {
    fn same_kind(self, other: Call) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

/// Test Service double answering from per-operation queues.
///
/// An empty queue answers with a network error.
#[derive(Default)]
struct ScriptedApi {
    starts: Mutex<VecDeque<Result<StartResponse, ApiError>>>,
    resumes: Mutex<VecDeque<Result<ResumeResponse, ApiError>>>,
    answers: Mutex<VecDeque<Result<(), ApiError>>>,
    nexts: Mutex<VecDeque<Result<NextQuestion, ApiError>>>,
    finishes: Mutex<VecDeque<Result<ExamResult, ApiError>>>,
    listings: Mutex<Vec<TestListing>>,
    calls: Mutex<Vec<Call>>,
    dispose_on: Mutex<Option<(Call, DisposeHandle)>>,
}

impl ScriptedApi {
    fn push_start(&self, response: Result<StartResponse, ApiError>) {
        self.starts.lock().unwrap().push_back(response);
    }

    fn push_resume(&self, response: Result<ResumeResponse, ApiError>) {
        self.resumes.lock().unwrap().push_back(response);
    }

    fn push_answer(&self, response: Result<(), ApiError>) {
        self.answers.lock().unwrap().push_back(response);
    }

    fn push_next(&self, response: Result<NextQuestion, ApiError>) {
        self.nexts.lock().unwrap().push_back(response);
    }

    fn push_finish(&self, response: Result<ExamResult, ApiError>) {
        self.finishes.lock().unwrap().push_back(response);
    }

    fn set_listings(&self, listings: Vec<TestListing>) {
        *self.listings.lock().unwrap() = listings;
    }

    /// Dispose the manager while a call of this kind is in flight.
    fn dispose_during(&self, call: Call, handle: DisposeHandle) {
        *self.dispose_on.lock().unwrap() = Some((call, handle));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, kind: Call) -> usize {
        self.calls().into_iter().filter(|c| c.same_kind(kind)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        if let Some((trigger, handle)) = self.dispose_on.lock().unwrap().as_ref() {
            if trigger.same_kind(call) {
                handle.dispose();
            }
        }
    }

    fn pop<T>(queue: &Mutex<VecDeque<Result<T, ApiError>>>) -> Result<T, ApiError> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted call".into())))
    }
}

#[async_trait]
impl TestApi for ScriptedApi {
    async fn start(&self, test_id: TestId) -> Result<StartResponse, ApiError> {
        self.record(Call::Start(test_id));
        Self::pop(&self.starts)
    }

    async fn resume(&self, session_id: SessionId) -> Result<ResumeResponse, ApiError> {
        self.record(Call::Resume(session_id));
        Self::pop(&self.resumes)
    }

    async fn submit_answer(&self, _session_id: SessionId, answer: Answer) -> Result<(), ApiError> {
        self.record(Call::Answer(answer));
        Self::pop(&self.answers)
    }

    async fn next_question(&self, session_id: SessionId) -> Result<NextQuestion, ApiError> {
        self.record(Call::Next(session_id));
        Self::pop(&self.nexts)
    }

    async fn finish(&self, session_id: SessionId) -> Result<ExamResult, ApiError> {
        self.record(Call::Finish(session_id));
        Self::pop(&self.finishes)
    }

    async fn list_tests(&self) -> Result<Vec<TestListing>, ApiError> {
        self.record(Call::ListTests);
        Ok(self.listings.lock().unwrap().clone())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────────────

fn question(id: u64) -> Question {
    let options = (1..=3)
        .map(|n| AnswerOption {
            id: OptionId::new(id * 10 + n),
            label: ["A", "B", "C"][(n - 1) as usize].to_string(),
            text: format!("Option {n}"),
        })
        .collect();
    Question::new(QuestionId::new(id), format!("Question {id}"), options).unwrap()
}

fn option(question_id: u64, n: u64) -> OptionId {
    OptionId::new(question_id * 10 + n)
}

fn started(total: u32, remaining: u32) -> StartResponse {
    StartResponse {
        session_id: SESSION,
        duration_seconds: remaining,
        first_question: Some(question(1)),
        total_questions: total,
        resume: false,
        current_index: 1,
        remaining_seconds: remaining,
    }
}

fn resumed(index: u32, total: u32, remaining: u32) -> ResumeResponse {
    ResumeResponse {
        current_question: Some(question(u64::from(index))),
        total_questions: total,
        remaining_seconds: remaining,
        current_index: index,
    }
}

fn result(correct: u32, total: u32, score: f64) -> ExamResult {
    ExamResult::new(correct, total, score).unwrap()
}

struct Harness {
    api: Arc<ScriptedApi>,
    store: InMemoryCheckpointStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            api: Arc::new(ScriptedApi::default()),
            store: InMemoryCheckpointStore::new(),
        }
    }

    fn manager(&self) -> SessionManager {
        SessionManager::new(TEST, self.api.clone(), Arc::new(self.store.clone()))
            .with_clock(fixed_clock())
    }

    async fn checkpoint(&self) -> Option<SessionCheckpoint> {
        self.store.load(TEST).await.unwrap()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_question_run_finishes_with_result() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));
    h.api.push_answer(Ok(()));
    h.api.push_next(Ok(NextQuestion::Question(question(2))));
    h.api.push_answer(Ok(()));
    h.api.push_next(Ok(NextQuestion::ExamComplete));
    h.api.push_finish(Ok(result(1, 2, 50.0)));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(
        h.checkpoint().await,
        Some(SessionCheckpoint::new(SESSION, 600, 1))
    );

    manager.select_option(option(1, 2)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(manager.current_index(), 2);
    assert_eq!(manager.view().submit_label(), "Finish");
    assert_eq!(h.checkpoint().await.unwrap().current_index, 2);

    manager.select_option(option(2, 1)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::Finished);

    let completion = manager.completion().unwrap();
    assert_eq!(completion.result, Some(result(1, 2, 50.0)));
    assert_eq!(completion.reason, FinishReason::AllAnswered);
    assert_eq!(h.checkpoint().await, None);
    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
    assert!(!manager.is_timer_running());
    assert!(matches!(
        manager.view().redirect,
        Some(Redirect::ToTestList { .. })
    ));
}

#[tokio::test]
async fn expiry_finishes_and_drops_unsent_selection() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 3)));
    h.api.push_finish(Ok(result(0, 2, 0.0)));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    manager.select_option(option(1, 1)).unwrap();

    assert_eq!(manager.tick().await, Phase::AwaitingAnswer);
    assert_eq!(manager.remaining_seconds(), 2);
    assert_eq!(manager.tick().await, Phase::AwaitingAnswer);
    assert_eq!(manager.tick().await, Phase::Finished);

    let completion = manager.completion().unwrap();
    assert_eq!(completion.reason, FinishReason::TimeExpired);
    assert_eq!(completion.result.unwrap().correct_answers(), 0);
    assert!(!h.api.calls().iter().any(|call| matches!(call, Call::Answer(_))));
    assert_eq!(h.checkpoint().await, None);
}

#[tokio::test]
async fn unknown_checkpoint_session_fails_and_clears() {
    let h = Harness::new();
    h.store
        .save(TEST, &SessionCheckpoint::new(SessionId::new(99), 120, 3))
        .await
        .unwrap();
    h.api.push_resume(Err(ApiError::SessionNotFound));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::Failed);

    let failure = manager.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::SessionNotFound);
    assert_eq!(failure.message, "Your session could not be restored.");
    assert_eq!(h.checkpoint().await, None);
    assert_eq!(h.api.calls(), vec![Call::Resume(SessionId::new(99))]);
    assert_eq!(
        manager.reload().await.unwrap_err(),
        IntentError::NotRetryable
    );
}

#[tokio::test]
async fn checkpoint_resumes_same_session() {
    let h = Harness::new();
    h.store
        .save(TEST, &SessionCheckpoint::new(SESSION, 120, 3))
        .await
        .unwrap();
    h.api.push_resume(Ok(resumed(3, 5, 118)));

    let mut manager = h.manager();
    let updates = manager.subscribe();
    assert_eq!(manager.initialize().await.unwrap(), Phase::AwaitingAnswer);

    assert_eq!(h.api.calls(), vec![Call::Resume(SESSION)]);
    assert_eq!(manager.session_id(), Some(SESSION));
    assert_eq!(manager.current_index(), 3);
    assert_eq!(manager.remaining_seconds(), 118);

    let view = updates.borrow().clone();
    assert_eq!(view.progress_label(), "Question 3 / 5");
    assert_eq!(view.remaining_label(), "01:58");
}

#[tokio::test]
async fn reload_mid_question_keeps_index() {
    let h = Harness::new();
    h.api.push_start(Ok(started(3, 600)));
    h.api.push_answer(Ok(()));
    h.api.push_next(Ok(NextQuestion::Question(question(2))));

    let mut first = h.manager();
    first.initialize().await.unwrap();
    first.select_option(option(1, 3)).unwrap();
    first.submit().await.unwrap();
    first.select_option(option(2, 1)).unwrap();
    drop(first);

    h.api.push_resume(Ok(resumed(2, 3, 590)));
    let mut second = h.manager();
    assert_eq!(second.initialize().await.unwrap(), Phase::AwaitingAnswer);

    assert_eq!(second.current_index(), 2);
    assert_eq!(second.view().selected, None);
    assert_eq!(h.checkpoint().await.unwrap().current_index, 2);
    assert_eq!(h.api.count(Call::Start(TEST)), 1);
}

#[tokio::test]
async fn finish_is_sent_at_most_once() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 2)));
    h.api.push_finish(Ok(result(0, 2, 0.0)));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();

    assert_eq!(manager.request_finish().await.unwrap(), Phase::Finished);
    assert_eq!(manager.tick().await, Phase::Finished);
    assert_eq!(manager.tick().await, Phase::Finished);
    assert_eq!(manager.request_finish().await.unwrap(), Phase::Finished);

    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
    assert_eq!(
        manager.completion().unwrap().reason,
        FinishReason::UserRequested
    );
}

#[tokio::test]
async fn expiry_then_user_finish_sends_one_finish() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 1)));
    h.api.push_finish(Ok(result(0, 2, 0.0)));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    assert_eq!(manager.tick().await, Phase::Finished);
    assert_eq!(manager.request_finish().await.unwrap(), Phase::Finished);

    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
}

#[tokio::test]
async fn finish_conflict_counts_as_completion() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));
    h.api.push_finish(Err(ApiError::SessionFinished));
    h.api.set_listings(vec![TestListing {
        definition: TestDefinition {
            id: TEST,
            title: "Algebra".into(),
            total_questions: 2,
            time_limit_secs: 600,
        },
        status: TestStatus::Completed,
        session_id: Some(SESSION),
        result: Some(result(2, 2, 100.0)),
    }]);

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    assert_eq!(manager.request_finish().await.unwrap(), Phase::Finished);

    let completion = manager.completion().unwrap();
    assert_eq!(completion.reason, FinishReason::AlreadyClosed);
    assert_eq!(completion.result, Some(result(2, 2, 100.0)));
    assert!(manager.failure().is_none());
    assert_eq!(h.checkpoint().await, None);
}

#[tokio::test]
async fn answer_rejected_as_finished_leads_to_completion() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));
    h.api.push_answer(Err(ApiError::SessionFinished));
    h.api.push_finish(Err(ApiError::SessionFinished));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    manager.select_option(option(1, 1)).unwrap();

    assert_eq!(manager.submit().await.unwrap(), Phase::Finished);
    let completion = manager.completion().unwrap();
    assert_eq!(completion.reason, FinishReason::AlreadyClosed);
    assert_eq!(completion.result, None);
    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
}

#[tokio::test]
async fn dispose_discards_late_response() {
    let h = Harness::new();
    h.api.push_start(Ok(started(3, 600)));
    h.api.push_answer(Ok(()));
    h.api.push_next(Ok(NextQuestion::Question(question(2))));

    let mut manager = h.manager();
    let updates = manager.subscribe();
    manager.initialize().await.unwrap();
    h.api
        .dispose_during(Call::Next(SESSION), manager.dispose_handle());

    manager.select_option(option(1, 2)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::Submitting);

    assert!(manager.is_disposed());
    assert_eq!(manager.current_index(), 1);
    assert_eq!(h.checkpoint().await.unwrap().current_index, 1);
    assert_eq!(updates.borrow().phase, Phase::Submitting);
    assert_eq!(manager.submit().await.unwrap_err(), IntentError::Disposed);
    assert_eq!(manager.tick().await, Phase::Submitting);
}

#[tokio::test]
async fn network_failure_keeps_checkpoint_and_reload_resumes() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));
    h.api.push_answer(Err(ApiError::Network("connection reset".into())));
    h.api.push_resume(Ok(resumed(1, 2, 570)));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    manager.select_option(option(1, 1)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::Failed);

    assert_eq!(manager.failure().unwrap().kind, FailureKind::Network);
    assert_eq!(manager.view().redirect, None);
    assert_eq!(
        h.checkpoint().await,
        Some(SessionCheckpoint::new(SESSION, 600, 1))
    );

    assert_eq!(manager.reload().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(manager.current_index(), 1);
    assert_eq!(manager.remaining_seconds(), 570);
    assert!(manager.failure().is_none());
    assert_eq!(h.api.count(Call::Start(TEST)), 1);
    assert_eq!(h.api.count(Call::Resume(SESSION)), 1);
}

#[tokio::test]
async fn already_taken_redirects_to_result() {
    let h = Harness::new();
    h.api.push_start(Err(ApiError::AlreadyTaken {
        session_id: SessionId::new(5),
    }));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::Failed);
    assert_eq!(
        manager.view().redirect,
        Some(Redirect::ToResult {
            session_id: SessionId::new(5)
        })
    );
}

#[tokio::test]
async fn session_hint_wins_over_checkpoint() {
    let h = Harness::new();
    h.store
        .save(TEST, &SessionCheckpoint::new(SessionId::new(3), 50, 4))
        .await
        .unwrap();
    h.api.push_resume(Ok(resumed(2, 5, 300)));

    let mut manager = h.manager().with_session_hint(Some(SESSION));
    manager.initialize().await.unwrap();

    assert_eq!(h.api.calls(), vec![Call::Resume(SESSION)]);
    assert_eq!(
        h.checkpoint().await,
        Some(SessionCheckpoint::new(SESSION, 300, 2))
    );
}

#[tokio::test]
async fn corrupt_checkpoint_is_replaced_by_new_session() {
    let h = Harness::new();
    h.store.put_raw(TEST, "{\"sessionId\":").unwrap();
    h.api.push_start(Ok(started(2, 600)));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(h.api.calls(), vec![Call::Start(TEST)]);
    assert_eq!(h.checkpoint().await.unwrap().session_id, SESSION);
}

#[tokio::test]
async fn start_returning_active_session_is_resumed() {
    let h = Harness::new();
    h.api.push_start(Ok(StartResponse {
        first_question: Some(question(4)),
        resume: true,
        current_index: 4,
        remaining_seconds: 200,
        ..started(5, 600)
    }));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    assert_eq!(manager.current_index(), 4);
    assert_eq!(manager.remaining_seconds(), 200);
}

#[tokio::test]
async fn user_finish_sends_pending_selection_first() {
    let h = Harness::new();
    h.api.push_start(Ok(started(3, 600)));
    h.api.push_answer(Ok(()));
    h.api.push_finish(Ok(result(1, 3, 33.33)));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    manager.select_option(option(1, 2)).unwrap();
    manager.request_finish().await.unwrap();

    let answer = question(1).answer(option(1, 2)).unwrap();
    assert_eq!(
        h.api.calls(),
        vec![
            Call::Start(TEST),
            Call::Answer(answer),
            Call::Finish(SESSION)
        ]
    );
}

#[tokio::test]
async fn intents_are_validated() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));

    let mut manager = h.manager();
    assert!(matches!(
        manager.submit().await,
        Err(IntentError::WrongPhase { .. })
    ));
    manager.initialize().await.unwrap();

    assert_eq!(manager.submit().await.unwrap_err(), IntentError::NoSelection);
    assert!(matches!(
        manager.select_option(option(9, 1)),
        Err(IntentError::Question(_))
    ));
    assert!(matches!(
        manager.initialize().await,
        Err(IntentError::WrongPhase { .. })
    ));
    assert_eq!(manager.view().selected, None);
    assert_eq!(h.api.calls(), vec![Call::Start(TEST)]);
}

#[tokio::test]
async fn overrunning_index_is_invalid_format() {
    let h = Harness::new();
    h.api.push_start(Ok(started(1, 600)));
    h.api.push_answer(Ok(()));
    h.api.push_next(Ok(NextQuestion::Question(question(2))));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    manager.select_option(option(1, 1)).unwrap();

    assert_eq!(manager.submit().await.unwrap(), Phase::Failed);
    assert_eq!(
        manager.failure().unwrap().kind,
        FailureKind::InvalidQuestionFormat
    );
    assert_eq!(h.checkpoint().await, None);
}

#[tokio::test]
async fn unauthorized_resume_keeps_checkpoint_and_asks_for_login() {
    let h = Harness::new();
    let saved = SessionCheckpoint::new(SESSION, 120, 3);
    h.store.save(TEST, &saved).await.unwrap();
    h.api.push_resume(Err(ApiError::Unauthorized));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::Failed);

    let failure = manager.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Unauthorized);
    assert!(failure.kind.is_transient());
    assert_eq!(manager.view().redirect, Some(Redirect::ToLogin));
    assert_eq!(h.checkpoint().await, Some(saved));
    assert_eq!(h.api.count(Call::Finish(SESSION)), 0);
}

#[tokio::test]
async fn resume_with_every_question_answered_finishes() {
    let h = Harness::new();
    h.store
        .save(TEST, &SessionCheckpoint::new(SESSION, 30, 2))
        .await
        .unwrap();
    h.api.push_resume(Ok(ResumeResponse {
        current_question: None,
        total_questions: 2,
        remaining_seconds: 30,
        current_index: 2,
    }));
    h.api.push_finish(Ok(result(1, 2, 50.0)));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::Finished);

    let completion = manager.completion().unwrap();
    assert_eq!(completion.reason, FinishReason::AllAnswered);
    assert_eq!(completion.result, Some(result(1, 2, 50.0)));
    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
    assert_eq!(h.checkpoint().await, None);
}

#[tokio::test]
async fn start_with_every_question_answered_finishes() {
    let h = Harness::new();
    h.api.push_start(Ok(StartResponse {
        first_question: None,
        resume: true,
        current_index: 3,
        ..started(3, 45)
    }));
    h.api.push_finish(Ok(result(3, 3, 100.0)));

    let mut manager = h.manager();
    assert_eq!(manager.initialize().await.unwrap(), Phase::Finished);
    assert_eq!(h.api.count(Call::Finish(SESSION)), 1);
    assert!(!manager.is_timer_running());
}

#[tokio::test]
async fn finish_network_failure_keeps_checkpoint_and_reload_resumes() {
    let h = Harness::new();
    h.api.push_start(Ok(started(2, 600)));
    h.api.push_finish(Err(ApiError::Network("timed out".into())));

    let mut manager = h.manager();
    manager.initialize().await.unwrap();
    assert_eq!(manager.request_finish().await.unwrap(), Phase::Failed);

    assert_eq!(manager.failure().unwrap().kind, FailureKind::Network);
    assert_eq!(manager.view().redirect, None);
    assert!(manager.completion().is_none());
    assert_eq!(
        h.checkpoint().await,
        Some(SessionCheckpoint::new(SESSION, 600, 1))
    );

    h.api.push_resume(Ok(resumed(1, 2, 580)));
    assert_eq!(manager.reload().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(manager.current_index(), 1);
    assert_eq!(manager.remaining_seconds(), 580);
    assert_eq!(h.api.count(Call::Resume(SESSION)), 1);
    assert_eq!(h.api.count(Call::Start(TEST)), 1);
}

/// Store whose writes always fail; reads find nothing.
struct ReadOnlyStore;

#[async_trait]
impl CheckpointStore for ReadOnlyStore {
    async fn load(&self, _test_id: TestId) -> Result<Option<SessionCheckpoint>, StorageError> {
        Ok(None)
    }

    async fn save(
        &self,
        _test_id: TestId,
        _checkpoint: &SessionCheckpoint,
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk is read-only".into()))
    }

    async fn clear(&self, _test_id: TestId) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk is read-only".into()))
    }
}

#[tokio::test]
async fn failed_checkpoint_write_does_not_block_the_exam() {
    let api = Arc::new(ScriptedApi::default());
    api.push_start(Ok(started(2, 600)));
    api.push_answer(Ok(()));
    api.push_next(Ok(NextQuestion::Question(question(2))));
    api.push_answer(Ok(()));
    api.push_next(Ok(NextQuestion::ExamComplete));
    api.push_finish(Ok(result(2, 2, 100.0)));

    let mut manager = SessionManager::new(TEST, api.clone(), Arc::new(ReadOnlyStore))
        .with_clock(fixed_clock());
    assert_eq!(manager.initialize().await.unwrap(), Phase::AwaitingAnswer);
    assert!(manager.failure().is_none());

    manager.select_option(option(1, 1)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::AwaitingAnswer);
    assert_eq!(manager.current_index(), 2);

    manager.select_option(option(2, 1)).unwrap();
    assert_eq!(manager.submit().await.unwrap(), Phase::Finished);
    assert_eq!(
        manager.completion().unwrap().result,
        Some(result(2, 2, 100.0))
    );
}
