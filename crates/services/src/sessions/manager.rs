use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use exam_core::model::{
    Answer, ExamResult, OptionId, Question, SessionCheckpoint, SessionId, TestId,
};
use exam_core::{Clock, Countdown, TickOutcome, TickToken};
use storage::repository::{CheckpointStore, StorageError};

use super::failure::{Failure, FailureKind, Stage};
use super::view::{
    Completion, FinishReason, Phase, REDIRECT_DELAY, Redirect, SessionIntent, SessionView,
};
use crate::client::{NextQuestion, TestApi};
use crate::error::{ApiError, IntentError};

/// Marks a manager as torn down. Cloneable so the shell can dispose from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct DisposeHandle(Arc<AtomicBool>);

impl DisposeHandle {
    pub fn dispose(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

//
// ─── SESSION MANAGER ───────────────────────────────────────────────────────────
//

/// Drives one student's run through a timed test.
///
/// All operations take `&mut self`, so at most one Test Service call is in
/// flight at a time. `finish` is only ever issued from `enter_finishing`, which
/// refuses once the phase has reached `Finishing`; that phase is the whole
/// finish guard.
pub struct SessionManager {
    test_id: TestId,
    session_hint: Option<SessionId>,
    api: Arc<dyn TestApi>,
    checkpoints: Arc<dyn CheckpointStore>,
    clock: Clock,

    phase: Phase,
    session_id: Option<SessionId>,
    question: Option<Question>,
    selected: Option<OptionId>,
    current_index: u32,
    total_questions: u32,
    remaining_seconds: u32,
    countdown: Countdown,
    tick_token: Option<TickToken>,
    completion: Option<Completion>,
    failure: Option<Failure>,
    redirect: Option<Redirect>,

    disposed: DisposeHandle,
    updates: watch::Sender<SessionView>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        test_id: TestId,
        api: Arc<dyn TestApi>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let (updates, _) = watch::channel(SessionView::default());
        Self {
            test_id,
            session_hint: None,
            api,
            checkpoints,
            clock: Clock::default(),
            phase: Phase::Uninitialized,
            session_id: None,
            question: None,
            selected: None,
            current_index: 1,
            total_questions: 0,
            remaining_seconds: 0,
            countdown: Countdown::new(),
            tick_token: None,
            completion: None,
            failure: None,
            redirect: None,
            disposed: DisposeHandle::default(),
            updates,
        }
    }

    /// Session id handed over by navigation; takes priority over the checkpoint.
    #[must_use]
    pub fn with_session_hint(mut self, session_id: Option<SessionId>) -> Self {
        self.session_hint = session_id.filter(SessionId::is_plausible);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    #[must_use]
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.countdown.is_running()
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            session_id: self.session_id,
            question: self.question.clone(),
            selected: self.selected,
            current_index: self.current_index,
            total_questions: self.total_questions,
            remaining_seconds: self.remaining_seconds,
            completion: self.completion.clone(),
            failure: self.failure.clone(),
            redirect: self.redirect,
        }
    }

    /// Receive a fresh `SessionView` after every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn dispose_handle(&self) -> DisposeHandle {
        self.disposed.clone()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.is_disposed()
    }

    /// Tear down: stop the countdown and turn any late response into a no-op.
    pub fn dispose(&mut self) {
        if !self.is_disposed() {
            info!(test_id = %self.test_id, phase = %self.phase, "disposing session manager");
        }
        self.disposed.dispose();
        self.disarm_timer();
    }

    //
    // ─── INTENTS ──────────────────────────────────────────────────────────────
    //

    /// Decide between resuming and starting, then load the current question.
    ///
    /// Priority: the session hint, then a stored checkpoint, then `start`.
    ///
    /// # Errors
    ///
    /// Returns `IntentError` if the manager was already initialized or disposed.
    /// Service failures are not errors here; they end in `Phase::Failed`.
    pub async fn initialize(&mut self) -> Result<Phase, IntentError> {
        self.ensure_live()?;
        self.require_phase(Phase::Uninitialized, "initialize")?;
        self.phase = Phase::Initializing;
        self.publish();

        if let Some(session_id) = self.session_hint {
            info!(test_id = %self.test_id, %session_id, "resuming supplied session");
            self.session_id = Some(session_id);
            return Ok(self.resume_session(session_id).await);
        }

        let store = Arc::clone(&self.checkpoints);
        let Some(loaded) = self.settle(store.load(self.test_id)).await else {
            return Ok(self.phase);
        };

        let phase = match loaded {
            Ok(Some(checkpoint)) if checkpoint.is_plausible() => {
                info!(
                    test_id = %self.test_id,
                    session_id = %checkpoint.session_id,
                    index = checkpoint.current_index,
                    "resuming from checkpoint"
                );
                // Shown while the server answers; replaced by its values.
                self.session_id = Some(checkpoint.session_id);
                self.remaining_seconds = checkpoint.remaining_seconds;
                self.current_index = checkpoint.current_index.max(1);
                self.publish();
                self.resume_session(checkpoint.session_id).await
            }
            Ok(Some(checkpoint)) => {
                warn!(test_id = %self.test_id, ?checkpoint, "ignoring checkpoint without a session");
                self.clear_checkpoint().await;
                self.start_session().await
            }
            Ok(None) => self.start_session().await,
            Err(err @ StorageError::Serialization(_)) => {
                warn!(test_id = %self.test_id, error = %err, "discarding unreadable checkpoint");
                self.clear_checkpoint().await;
                self.start_session().await
            }
            Err(err) => {
                warn!(test_id = %self.test_id, error = %err, "checkpoint unavailable");
                self.start_session().await
            }
        };
        Ok(phase)
    }

    /// Mark an option of the current question as the pending answer.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::WrongPhase` outside `AwaitingAnswer` and
    /// `IntentError::Question` for an option the question does not list.
    pub fn select_option(&mut self, option_id: OptionId) -> Result<(), IntentError> {
        self.ensure_live()?;
        self.require_phase(Phase::AwaitingAnswer, "select an option")?;
        let question = self.question.as_ref().ok_or(IntentError::WrongPhase {
            action: "select an option",
            phase: self.phase,
        })?;
        question.answer(option_id)?;
        self.selected = Some(option_id);
        self.publish();
        Ok(())
    }

    /// Send the selected answer, then fetch the next question.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::NoSelection` when nothing is selected and
    /// `IntentError::WrongPhase` outside `AwaitingAnswer`.
    pub async fn submit(&mut self) -> Result<Phase, IntentError> {
        self.ensure_live()?;
        self.require_phase(Phase::AwaitingAnswer, "submit")?;
        let answer = self.pending_answer()?.ok_or(IntentError::NoSelection)?;
        let session_id = self.active_session("submit")?;

        self.phase = Phase::Submitting;
        self.publish();

        let api = Arc::clone(&self.api);
        let Some(sent) = self.settle(api.submit_answer(session_id, answer)).await else {
            return Ok(self.phase);
        };
        if let Err(err) = sent {
            return Ok(self.handle_error(err, Stage::Answer).await);
        }
        debug!(%session_id, index = self.current_index, "answer accepted");
        self.selected = None;

        let Some(next) = self.settle(api.next_question(session_id)).await else {
            return Ok(self.phase);
        };
        let phase = match next {
            Ok(NextQuestion::Question(question)) => self.advance(question).await,
            Ok(NextQuestion::ExamComplete) => {
                info!(%session_id, "no questions left");
                self.phase = Phase::ExamComplete;
                self.question = None;
                self.publish();
                self.enter_finishing(FinishReason::AllAnswered).await
            }
            Err(err) => self.handle_error(err, Stage::Next).await,
        };
        Ok(phase)
    }

    /// Finish now. A selected but unsent answer is submitted first.
    ///
    /// Asking again while finishing or finished is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::WrongPhase` before a question has been delivered
    /// or after a failure.
    pub async fn request_finish(&mut self) -> Result<Phase, IntentError> {
        self.ensure_live()?;
        if self.phase.is_finishing() {
            debug!(test_id = %self.test_id, phase = %self.phase, "finish already requested");
            return Ok(self.phase);
        }
        self.require_phase(Phase::AwaitingAnswer, "finish")?;

        if let Some(answer) = self.pending_answer()? {
            let session_id = self.active_session("finish")?;
            self.phase = Phase::Submitting;
            self.publish();

            let api = Arc::clone(&self.api);
            let Some(sent) = self.settle(api.submit_answer(session_id, answer)).await else {
                return Ok(self.phase);
            };
            if let Err(err) = sent {
                return Ok(self.handle_error(err, Stage::Answer).await);
            }
            self.selected = None;
        }

        Ok(self.enter_finishing(FinishReason::UserRequested).await)
    }

    /// Advance the countdown by one second. Expiry finishes the exam.
    pub async fn tick(&mut self) -> Phase {
        if self.is_disposed() {
            return self.phase;
        }
        let Some(token) = self.tick_token else {
            return self.phase;
        };

        match self.countdown.tick(token) {
            TickOutcome::Ignored => {}
            TickOutcome::Ticked { remaining } => {
                self.remaining_seconds = remaining;
                self.publish();
            }
            TickOutcome::Expired => {
                self.remaining_seconds = 0;
                self.tick_token = None;
                if self.phase == Phase::AwaitingAnswer {
                    if let Some(option_id) = self.selected.take() {
                        info!(test_id = %self.test_id, %option_id, "time is up, unsent answer dropped");
                    }
                    return self.enter_finishing(FinishReason::TimeExpired).await;
                }
                debug!(phase = %self.phase, "countdown expired outside of answering");
                self.publish();
            }
        }
        self.phase
    }

    /// Start over after a transient failure, resuming the same session if known.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::NotRetryable` unless the run failed transiently.
    pub async fn reload(&mut self) -> Result<Phase, IntentError> {
        self.ensure_live()?;
        self.require_phase(Phase::Failed, "reload")?;
        let retryable = self
            .failure
            .as_ref()
            .is_some_and(|failure| failure.kind.is_transient());
        if !retryable {
            return Err(IntentError::NotRetryable);
        }

        info!(test_id = %self.test_id, session_id = ?self.session_id, "reloading session");
        self.session_hint = self.session_id.or(self.session_hint);
        self.phase = Phase::Uninitialized;
        self.question = None;
        self.selected = None;
        self.failure = None;
        self.redirect = None;
        self.completion = None;
        self.initialize().await
    }

    /// Apply a presentation-layer intent.
    ///
    /// # Errors
    ///
    /// Propagates the `IntentError` of the underlying operation.
    pub async fn dispatch(&mut self, intent: SessionIntent) -> Result<Phase, IntentError> {
        match intent {
            SessionIntent::Select(option_id) => {
                self.select_option(option_id)?;
                Ok(self.phase)
            }
            SessionIntent::Submit => self.submit().await,
            SessionIntent::RequestFinish => self.request_finish().await,
        }
    }

    //
    // ─── TRANSITIONS ──────────────────────────────────────────────────────────
    //

    async fn resume_session(&mut self, session_id: SessionId) -> Phase {
        let api = Arc::clone(&self.api);
        let Some(outcome) = self.settle(api.resume(session_id)).await else {
            return self.phase;
        };
        match outcome {
            Ok(resume) => {
                self.enter_session(
                    resume.current_question,
                    resume.total_questions,
                    resume.current_index,
                    resume.remaining_seconds,
                    Stage::Restore,
                )
                .await
            }
            Err(err) => self.handle_error(err, Stage::Restore).await,
        }
    }

    async fn start_session(&mut self) -> Phase {
        let api = Arc::clone(&self.api);
        let Some(outcome) = self.settle(api.start(self.test_id)).await else {
            return self.phase;
        };
        let start = match outcome {
            Ok(start) => start,
            Err(err) => return self.handle_error(err, Stage::Start).await,
        };
        if !start.session_id.is_plausible() {
            let err = ApiError::InvalidQuestionFormat("start returned no session id".into());
            return self.handle_error(err, Stage::Start).await;
        }

        if start.resume {
            info!(test_id = %self.test_id, session_id = %start.session_id, "server returned the active session");
        } else {
            info!(
                test_id = %self.test_id,
                session_id = %start.session_id,
                duration = start.duration_seconds,
                "started new session"
            );
        }
        self.session_id = Some(start.session_id);
        self.enter_session(
            start.first_question,
            start.total_questions,
            start.current_index,
            start.remaining_seconds,
            if start.resume { Stage::Restore } else { Stage::Start },
        )
        .await
    }

    /// Adopt the server's view of the session and arm the countdown.
    async fn enter_session(
        &mut self,
        question: Option<Question>,
        total_questions: u32,
        current_index: u32,
        remaining_seconds: u32,
        stage: Stage,
    ) -> Phase {
        let current_index = current_index.max(1);
        self.total_questions = total_questions;
        self.remaining_seconds = remaining_seconds;

        match question {
            Some(_) if current_index > total_questions => {
                let err = ApiError::InvalidQuestionFormat(format!(
                    "question index {current_index} exceeds total {total_questions}"
                ));
                self.handle_error(err, stage).await
            }
            Some(question) => {
                self.current_index = current_index;
                self.question = Some(question);
                self.tick_token = Some(self.countdown.arm(remaining_seconds));
                self.enter_awaiting().await
            }
            None if total_questions > 0 && current_index >= total_questions => {
                info!(test_id = %self.test_id, "every question already answered");
                self.current_index = total_questions;
                self.enter_finishing(FinishReason::AllAnswered).await
            }
            None => {
                let err = ApiError::InvalidQuestionFormat("session has no current question".into());
                self.handle_error(err, stage).await
            }
        }
    }

    async fn advance(&mut self, question: Question) -> Phase {
        let next_index = self.current_index.saturating_add(1);
        if next_index > self.total_questions {
            let err = ApiError::InvalidQuestionFormat(format!(
                "question {next_index} exceeds total {}",
                self.total_questions
            ));
            return self.handle_error(err, Stage::Next).await;
        }
        self.current_index = next_index;
        self.question = Some(question);
        self.enter_awaiting().await
    }

    /// Persist the settled position, then wait for a selection.
    ///
    /// The save is awaited before the phase changes. A failed save is logged
    /// and does not stop the exam; the stored checkpoint stays stale until the
    /// next successful save, and without one a reload goes through `start`.
    async fn enter_awaiting(&mut self) -> Phase {
        if let Some(session_id) = self.session_id {
            let checkpoint =
                SessionCheckpoint::new(session_id, self.remaining_seconds, self.current_index);
            let store = Arc::clone(&self.checkpoints);
            match self.settle(store.save(self.test_id, &checkpoint)).await {
                None => return self.phase,
                Some(Err(err)) => {
                    warn!(test_id = %self.test_id, error = %err, "checkpoint not saved");
                }
                Some(Ok(())) => {}
            }
        }

        self.phase = Phase::AwaitingAnswer;
        self.selected = None;
        debug!(
            test_id = %self.test_id,
            index = self.current_index,
            total = self.total_questions,
            remaining = self.remaining_seconds,
            "awaiting answer"
        );
        self.publish();
        self.phase
    }

    /// The single gate to `finish`.
    async fn enter_finishing(&mut self, reason: FinishReason) -> Phase {
        if self.phase.is_finishing() {
            debug!(test_id = %self.test_id, ?reason, "finish already in progress");
            return self.phase;
        }
        let Some(session_id) = self.session_id else {
            return self
                .fail(Failure {
                    kind: FailureKind::SessionNotFound,
                    message: "There is no session to finish.".into(),
                })
                .await;
        };

        info!(test_id = %self.test_id, %session_id, ?reason, "finishing session");
        self.phase = Phase::Finishing;
        self.disarm_timer();
        self.publish();

        let api = Arc::clone(&self.api);
        let Some(outcome) = self.settle(api.finish(session_id)).await else {
            return self.phase;
        };
        match outcome {
            Ok(result) => self.complete(Some(result), reason).await,
            Err(ApiError::SessionFinished) => {
                info!(%session_id, "session was already finished");
                let result = self.lookup_result().await;
                self.complete(result, FinishReason::AlreadyClosed).await
            }
            Err(err) => self.fail(Failure::from_api(&err, Stage::Finish)).await,
        }
    }

    async fn complete(&mut self, result: Option<ExamResult>, reason: FinishReason) -> Phase {
        self.disarm_timer();
        self.clear_checkpoint().await;
        if self.is_disposed() {
            return self.phase;
        }

        self.phase = Phase::Finished;
        self.question = None;
        self.selected = None;
        self.completion = Some(Completion {
            result,
            reason,
            finished_at: self.clock.now(),
        });
        self.redirect = Some(Redirect::ToTestList {
            after: REDIRECT_DELAY,
        });
        info!(
            test_id = %self.test_id,
            session_id = ?self.session_id,
            correct = result.map(|r| r.correct_answers()),
            total = result.map(|r| r.total_questions()),
            "session finished"
        );
        self.publish();
        self.phase
    }

    async fn fail(&mut self, failure: Failure) -> Phase {
        self.disarm_timer();
        if failure.kind.clears_checkpoint() {
            self.clear_checkpoint().await;
            if self.is_disposed() {
                return self.phase;
            }
        }

        warn!(
            test_id = %self.test_id,
            session_id = ?self.session_id,
            kind = ?failure.kind,
            message = %failure.message,
            "session failed"
        );
        self.redirect = Redirect::for_failure(&failure.kind);
        self.failure = Some(failure);
        self.phase = Phase::Failed;
        self.publish();
        self.phase
    }

    /// A finished-session conflict counts as completion; everything else fails the run.
    async fn handle_error(&mut self, err: ApiError, stage: Stage) -> Phase {
        match err {
            ApiError::SessionFinished if self.session_id.is_some() => {
                info!(test_id = %self.test_id, ?stage, "session closed by the server");
                self.enter_finishing(FinishReason::AlreadyClosed).await
            }
            err => self.fail(Failure::from_api(&err, stage)).await,
        }
    }

    /// Best available result after a finish conflict.
    async fn lookup_result(&self) -> Option<ExamResult> {
        let api = Arc::clone(&self.api);
        match self.settle(api.list_tests()).await? {
            Ok(tests) => tests
                .into_iter()
                .find(|listing| listing.id() == self.test_id)
                .and_then(|listing| listing.result),
            Err(err) => {
                debug!(test_id = %self.test_id, error = %err, "result lookup failed");
                None
            }
        }
    }

    //
    // ─── HELPERS ──────────────────────────────────────────────────────────────
    //

    /// Await a service or storage call unless the manager is disposed.
    ///
    /// Returns `None` if disposal happened before (the call is never polled) or
    /// while it was in flight (its outcome is dropped).
    async fn settle<T>(&self, pending: impl Future<Output = T>) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        let outcome = pending.await;
        if self.is_disposed() {
            debug!(test_id = %self.test_id, "discarding response for disposed session");
            return None;
        }
        Some(outcome)
    }

    async fn clear_checkpoint(&self) {
        let store = Arc::clone(&self.checkpoints);
        if let Some(Err(err)) = self.settle(store.clear(self.test_id)).await {
            warn!(test_id = %self.test_id, error = %err, "checkpoint not cleared");
        }
    }

    fn disarm_timer(&mut self) {
        self.countdown.disarm();
        self.tick_token = None;
    }

    fn publish(&self) {
        if !self.is_disposed() {
            self.updates.send_replace(self.view());
        }
    }

    fn ensure_live(&self) -> Result<(), IntentError> {
        if self.is_disposed() {
            return Err(IntentError::Disposed);
        }
        Ok(())
    }

    fn require_phase(&self, expected: Phase, action: &'static str) -> Result<(), IntentError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(IntentError::WrongPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn pending_answer(&self) -> Result<Option<Answer>, IntentError> {
        match (&self.question, self.selected) {
            (Some(question), Some(option_id)) => Ok(Some(question.answer(option_id)?)),
            _ => Ok(None),
        }
    }

    fn active_session(&self, action: &'static str) -> Result<SessionId, IntentError> {
        self.session_id.ok_or(IntentError::WrongPhase {
            action,
            phase: self.phase,
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.disposed.dispose();
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("test_id", &self.test_id)
            .field("session_id", &self.session_id)
            .field("phase", &self.phase)
            .field("current_index", &self.current_index)
            .field("total_questions", &self.total_questions)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("countdown", &self.countdown.state())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
