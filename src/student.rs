//! Student client
//!
//! One [`StudentClient`] is the state of one student's device for one test.
//! It owns its own [`SessionContext`], mirrors its participant record
//! locally and writes only partial merges, so concurrent edits of different
//! fields never clobber each other. Background writes that fail are kept and
//! retried on the next [`StudentClient::pump`] or [`StudentClient::tick`].
//!
//! Submission can be triggered three ways: the student submits, the local
//! countdown runs out, or the teacher ends the test. All three go through a
//! single [`SubmissionLatch`], so exactly one of them commits.

use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;
use tracing::{debug, info, warn};
use web_time::Duration;

use crate::{
    join_code::JoinCode,
    lifecycle::Status,
    names,
    order::{Origin, QuestionOrder, Shuffler},
    participant::{ParticipantRecord, Patch, Presence, StudentId, SubmissionLatch},
    quiz::{Answer, Answers, PublicQuestion, PublicTest, TestRecord},
    scoring::{self, Score},
    session::{SessionContext, WatchId},
    store::{self, DocPath, Snapshot, Target, Write, path},
    timer::{Countdown, Ticker, format_remaining},
};

/// Errors surfaced to the student
#[derive(Error, Debug)]
pub enum Error {
    /// The typed code does not resolve to a test
    #[error("no test with join code {0}")]
    NotFound(String),
    /// The display name was rejected
    #[error(transparent)]
    InvalidName(#[from] names::Error),
    /// The test has no questions to answer
    #[error("test {0} has no questions")]
    NoQuestions(JoinCode),
    /// The questions are not revealed yet
    #[error("test has not started")]
    NotStarted,
    /// The answer does not fit the question
    #[error("answer does not fit question {0}")]
    InvalidAnswer(usize),
    /// Results are only available after submission
    #[error("results are available after submission")]
    NotSubmitted,
    /// The store failed
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// What happened to a background update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The update was written
    Synced,
    /// The record is already submitted; the update was dropped
    Stale,
    /// The write failed and will be retried
    Deferred,
}

/// What happened to a submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This attempt committed the submission
    Submitted,
    /// An earlier attempt already committed it
    AlreadySubmitted,
    /// This attempt latched the submission but the write will be retried
    Deferred,
    /// The questions were never revealed
    NotStarted,
    /// The test was deleted; nothing was written
    Removed,
}

/// Why a submission was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubmitTrigger {
    /// The student submitted
    #[display("explicit")]
    Explicit,
    /// The countdown ran out
    #[display("deadline")]
    Deadline,
    /// The teacher ended the test
    #[display("ended")]
    Ended,
}

/// One question as shown to the student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownQuestion {
    /// 1-based number in this student's order
    pub number: usize,
    /// Index in the canonical test, used to answer
    pub index: usize,
    /// The question without its answer key
    pub question: PublicQuestion,
    /// The current selection, staged or committed
    pub answer: Answer,
}

/// What the student sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentScreen {
    /// The test has not started
    Waiting {
        /// Title of the test
        title: String,
    },
    /// The test is running
    Questions {
        /// Title of the test
        title: String,
        /// Time left on the countdown
        remaining: Duration,
        /// `remaining` as shown on the countdown, `MM:SS`
        countdown: String,
        /// Questions in this student's order
        questions: Vec<ShownQuestion>,
    },
    /// Answers are handed in
    Submitted,
    /// The test ended before this student saw the questions
    Closed,
    /// The teacher deleted the test
    Removed,
}

/// One student's session on one test
pub struct StudentClient {
    context: SessionContext,
    id: StudentId,
    code: JoinCode,
    test_watch: WatchId,
    test: PublicTest,
    record: ParticipantRecord,
    shuffler: Box<dyn Shuffler + Send>,
    latch: SubmissionLatch,
    ticker: Ticker,
    revealed: bool,
    closed: bool,
    removed: bool,
    staged: Answers,
    unsynced: Answers,
    presence_unsynced: Option<Presence>,
    order_unsynced: bool,
    submit_unsynced: bool,
}

impl std::fmt::Debug for StudentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudentClient")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("status", &self.test.status)
            .field("record", &self.record)
            .field("latch", &self.latch)
            .finish_non_exhaustive()
    }
}

impl StudentClient {
    /// Joins a test under a fresh student id
    ///
    /// # Errors
    ///
    /// See [`StudentClient::join_as`].
    pub fn join(context: SessionContext, name: &str, code: &str) -> Result<Self, Error> {
        let id = StudentId::new();
        let shuffler = context.options().shuffler_for(id);
        Self::join_as(context, id, name, code, shuffler)
    }

    /// Joins a test as `id`, resuming its participant record if one exists
    ///
    /// A stored question order is reused when it still fits the test. A
    /// record that is already submitted is resumed as submitted and nothing
    /// is written. Joining a test that has already ended stores the record
    /// as submitted right away.
    ///
    /// # Arguments
    ///
    /// * `context` - The device's session context, owned by the client
    /// * `id` - The student's id for this session
    /// * `name` - Display name as typed
    /// * `code` - Join code as typed
    /// * `shuffler` - Source of the question order for a new record
    ///
    /// # Errors
    ///
    /// * `Error::InvalidName` - The display name is rejected
    /// * `Error::NotFound` - The code is malformed or no test uses it
    /// * `Error::NoQuestions` - The test has nothing to answer
    /// * `Error::Store` - The store failed
    pub fn join_as<S: Shuffler + Send + 'static>(
        mut context: SessionContext,
        id: StudentId,
        name: &str,
        code: &str,
        shuffler: S,
    ) -> Result<Self, Error> {
        let name = names::validate_name(name)?;
        let code = JoinCode::from_str(code).map_err(|_| Error::NotFound(code.trim().to_owned()))?;
        let test: PublicTest = store::decode(
            context
                .store()
                .get(&path::test(code))?
                .ok_or_else(|| Error::NotFound(code.to_string()))?,
        )?;
        if test.questions.is_empty() {
            return Err(Error::NoQuestions(code));
        }

        let response = path::response(code, id);
        let existing = match context.store().get(&response)? {
            Some(doc) => store::decode::<ParticipantRecord>(doc)
                .inspect_err(|error| warn!(%code, student = %id, %error, "ignoring malformed record"))
                .ok(),
            None => None,
        };

        let mut shuffler: Box<dyn Shuffler + Send> = Box::new(shuffler);
        let latch = SubmissionLatch::default();
        let closed = test.status == Status::Ended
            && !existing.as_ref().is_some_and(ParticipantRecord::is_submitted);
        let record = match existing {
            Some(record) if record.is_submitted() => {
                latch.fire(context.now());
                info!(%code, student = %id, "rejoined submitted test");
                record
            }
            existing => {
                let (order, origin) = QuestionOrder::resolve(
                    existing.as_ref().map(|record| &record.order),
                    test.questions.len(),
                    shuffler.as_mut(),
                );
                let tab_status = if closed {
                    Presence::Submitted
                } else {
                    Presence::Active
                };
                let patch = Patch {
                    name: Some(name.clone()),
                    tab_status: Some(tab_status),
                    answers: Some(Answers::default()),
                    order: Some(order.clone()),
                    test_code: Some(code),
                };
                context
                    .store()
                    .set(&response, store::encode(&patch)?, Write::Merge)?;
                if closed {
                    latch.fire(context.now());
                    info!(%code, student = %id, "joined ended test");
                } else {
                    info!(%code, student = %id, reused = origin == Origin::Reused, "joined test");
                }
                ParticipantRecord {
                    name,
                    tab_status,
                    answers: existing.map(|record| record.answers).unwrap_or_default(),
                    order,
                    test_code: code,
                }
            }
        };

        let test_watch = context.watch(Target::Document(path::test(code)))?;
        let ticker = Ticker::new(context.options().tick_interval);
        let mut client = Self {
            context,
            id,
            code,
            test_watch,
            test,
            record,
            shuffler,
            latch,
            ticker,
            revealed: false,
            closed,
            removed: false,
            staged: Answers::default(),
            unsynced: Answers::default(),
            presence_unsynced: None,
            order_unsynced: false,
            submit_unsynced: false,
        };
        client.pump();
        Ok(client)
    }

    /// The student's id
    pub fn id(&self) -> StudentId {
        self.id
    }

    /// The joined test
    pub fn code(&self) -> JoinCode {
        self.code
    }

    /// The local mirror of the participant record
    pub fn record(&self) -> &ParticipantRecord {
        &self.record
    }

    /// The test as last observed
    pub fn test(&self) -> &PublicTest {
        &self.test
    }

    /// Whether this client has submitted
    pub fn is_submitted(&self) -> bool {
        self.latch.is_set()
    }

    fn response_path(&self) -> DocPath {
        path::response(self.code, self.id)
    }

    fn is_running(&self) -> bool {
        self.revealed && self.test.status == Status::Active && !self.removed
    }

    /// Applies test updates received since the last call
    ///
    /// Reveals the questions once the test is active, forces submission
    /// once it has ended and retries writes that failed earlier. Updates
    /// may arrive coalesced, so an ended test forces submission even if
    /// this client never saw it active.
    ///
    /// # Returns
    ///
    /// `true` if any notification was applied
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        for (watch, snapshot) in self.context.drain() {
            if watch != self.test_watch {
                continue;
            }
            match snapshot {
                Snapshot::Document(Some(doc)) => match store::decode::<PublicTest>(doc) {
                    Ok(test) => {
                        self.observe(test);
                        changed = true;
                    }
                    Err(error) => warn!(code = %self.code, %error, "ignoring malformed test"),
                },
                Snapshot::Document(None) => {
                    if !self.removed {
                        info!(code = %self.code, student = %self.id, "test was deleted");
                    }
                    self.removed = true;
                    self.ticker.disarm();
                    self.discard_unsynced();
                    changed = true;
                }
                Snapshot::Query(_) => {}
            }
        }
        self.sync();
        self.check_deadline();
        changed
    }

    fn observe(&mut self, test: PublicTest) {
        self.removed = false;
        if test.questions.len() != self.record.order.len() && !self.latch.is_set() {
            let (order, _) = QuestionOrder::resolve(
                Some(&self.record.order),
                test.questions.len(),
                self.shuffler.as_mut(),
            );
            debug!(code = %self.code, student = %self.id, "question count changed, new order");
            self.record.order = order;
            self.order_unsynced = true;
        }

        match test.status {
            Status::Pending => {
                self.revealed = false;
                self.ticker.disarm();
            }
            Status::Active => match test.started_at {
                Some(started_at) => {
                    self.revealed = true;
                    if self.ticker.arm(Countdown::new(started_at, test.time_limit())) {
                        debug!(code = %self.code, student = %self.id, "countdown armed");
                    }
                }
                None => warn!(code = %self.code, "active test has no start instant"),
            },
            Status::Ended => self.ticker.disarm(),
        }
        let ended = test.status == Status::Ended;
        self.test = test;
        if ended && !self.latch.is_set() {
            self.submit_with(SubmitTrigger::Ended);
        }
    }

    fn check_deadline(&mut self) {
        let expired = self
            .ticker
            .countdown()
            .is_some_and(|countdown| countdown.is_expired(self.context.now()));
        if expired && self.is_running() {
            self.submit_with(SubmitTrigger::Deadline);
        }
    }

    fn discard_unsynced(&mut self) {
        self.unsynced = Answers::default();
        self.presence_unsynced = None;
        self.order_unsynced = false;
        self.submit_unsynced = false;
    }

    /// Writes everything not yet in the store as one merge
    ///
    /// Once the test is deleted nothing is written, since a merge would
    /// recreate the participant record the teacher just removed.
    fn sync(&mut self) -> SyncOutcome {
        if self.removed {
            self.discard_unsynced();
            return SyncOutcome::Stale;
        }
        let patch = Patch {
            tab_status: if self.submit_unsynced {
                Some(Presence::Submitted)
            } else {
                self.presence_unsynced
            },
            answers: (!self.unsynced.is_empty()).then(|| self.unsynced.clone()),
            order: self.order_unsynced.then(|| self.record.order.clone()),
            ..Patch::default()
        };
        if patch == Patch::default() {
            return SyncOutcome::Synced;
        }
        let written = store::encode(&patch).and_then(|doc| {
            self.context
                .store()
                .set(&self.response_path(), doc, Write::Merge)
        });
        match written {
            Ok(()) => {
                self.discard_unsynced();
                SyncOutcome::Synced
            }
            Err(error) => {
                warn!(code = %self.code, student = %self.id, %error, "write failed, will retry");
                SyncOutcome::Deferred
            }
        }
    }

    fn check_answer(&self, index: usize, answer: &Answer) -> Result<(), Error> {
        if !self.is_running() {
            return Err(Error::NotStarted);
        }
        match self.test.questions.get(index) {
            Some(question) if question.accepts(answer) => Ok(()),
            _ => Err(Error::InvalidAnswer(index)),
        }
    }

    /// Commits an answer to the question at canonical `index`
    ///
    /// # Errors
    ///
    /// * `Error::NotStarted` - The questions are not revealed
    /// * `Error::InvalidAnswer` - The answer does not fit the question
    pub fn set_answer(&mut self, index: usize, answer: Answer) -> Result<SyncOutcome, Error> {
        if self.latch.is_set() {
            debug!(code = %self.code, student = %self.id, "dropping answer after submission");
            return Ok(SyncOutcome::Stale);
        }
        self.check_answer(index, &answer)?;
        let patch = Patch::answers(Answers::from_iter([(index, answer.clone())]));
        if self.record.apply(&patch).is_err() {
            debug!(code = %self.code, student = %self.id, "dropping stale answer");
            return Ok(SyncOutcome::Stale);
        }
        self.staged.remove(index);
        self.unsynced.set(index, answer);
        Ok(self.sync())
    }

    /// Records an in-form selection without committing it
    ///
    /// Staged selections are written together with the submission.
    ///
    /// # Errors
    ///
    /// * `Error::NotStarted` - The questions are not revealed
    /// * `Error::InvalidAnswer` - The answer does not fit the question
    pub fn stage(&mut self, index: usize, answer: Answer) -> Result<(), Error> {
        if self.latch.is_set() {
            return Ok(());
        }
        self.check_answer(index, &answer)?;
        self.staged.set(index, answer);
        Ok(())
    }

    /// Reports whether the test is in the foreground
    pub fn set_visibility(&mut self, visible: bool) -> SyncOutcome {
        if self.removed {
            debug!(code = %self.code, student = %self.id, "dropping presence for deleted test");
            return SyncOutcome::Stale;
        }
        let presence = Presence::from_visibility(visible);
        if self.latch.is_set() || self.record.apply(&Patch::presence(presence)).is_err() {
            debug!(code = %self.code, student = %self.id, "dropping presence after submission");
            return SyncOutcome::Stale;
        }
        self.presence_unsynced = Some(presence);
        self.sync()
    }

    /// Recomputes the countdown and submits once it runs out
    ///
    /// # Returns
    ///
    /// The time left, `None` while no countdown is armed
    pub fn tick(&mut self) -> Option<Duration> {
        self.sync();
        self.check_deadline();
        let now = self.context.now();
        self.ticker
            .countdown()
            .map(|countdown| countdown.remaining(now))
    }

    /// Hands in the answers
    pub fn submit(&mut self) -> SubmitOutcome {
        self.submit_with(SubmitTrigger::Explicit)
    }

    fn submit_with(&mut self, trigger: SubmitTrigger) -> SubmitOutcome {
        if self.removed {
            debug!(code = %self.code, student = %self.id, %trigger, "test was deleted");
            return SubmitOutcome::Removed;
        }
        if !self.latch.is_set() && !self.revealed && trigger != SubmitTrigger::Ended {
            return SubmitOutcome::NotStarted;
        }
        if !self.latch.fire(self.context.now()) {
            let submitted_at = self.latch.fired_at();
            debug!(
                code = %self.code,
                student = %self.id,
                %trigger,
                ?submitted_at,
                "already submitted"
            );
            if self.submit_unsynced && self.sync() == SyncOutcome::Deferred {
                return SubmitOutcome::Deferred;
            }
            return SubmitOutcome::AlreadySubmitted;
        }

        self.closed = !self.revealed;
        let staged = std::mem::take(&mut self.staged);
        for (index, answer) in staged.iter() {
            self.unsynced.set(index, answer.clone());
        }
        self.record.answers.merge(&staged);
        self.record.tab_status = Presence::Submitted;
        self.presence_unsynced = None;
        self.submit_unsynced = true;
        self.ticker.disarm();
        info!(code = %self.code, student = %self.id, %trigger, "submitted");

        match self.sync() {
            SyncOutcome::Deferred => SubmitOutcome::Deferred,
            _ => SubmitOutcome::Submitted,
        }
    }

    /// Scores the submitted answers against the stored test
    ///
    /// # Errors
    ///
    /// * `Error::NotSubmitted` - The student has not submitted
    /// * `Error::NotFound` - The test was deleted
    /// * `Error::Store` - The store failed
    pub fn results(&self) -> Result<Score, Error> {
        if !self.latch.is_set() {
            return Err(Error::NotSubmitted);
        }
        let doc = self
            .context
            .store()
            .get(&path::test(self.code))?
            .ok_or_else(|| Error::NotFound(self.code.to_string()))?;
        let test: TestRecord = store::decode(doc)?;
        Ok(scoring::score(&test.quiz.questions, &self.record.answers))
    }

    /// The current student-facing view
    pub fn screen(&self) -> StudentScreen {
        if self.removed {
            return StudentScreen::Removed;
        }
        if self.closed {
            return StudentScreen::Closed;
        }
        if self.latch.is_set() {
            return StudentScreen::Submitted;
        }
        match self.test.status {
            Status::Pending => StudentScreen::Waiting {
                title: self.test.title.clone(),
            },
            Status::Ended => StudentScreen::Closed,
            Status::Active if !self.revealed => StudentScreen::Waiting {
                title: self.test.title.clone(),
            },
            Status::Active => {
                let remaining = self.tick_remaining();
                StudentScreen::Questions {
                    title: self.test.title.clone(),
                    remaining,
                    countdown: format_remaining(remaining),
                    questions: self.shown_questions(),
                }
            }
        }
    }

    fn tick_remaining(&self) -> Duration {
        let now = self.context.now();
        self.ticker
            .countdown()
            .map_or(Duration::ZERO, |countdown| countdown.remaining(now))
    }

    fn shown_questions(&self) -> Vec<ShownQuestion> {
        self.record
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, index)| {
                let question = self.test.questions.get(index)?;
                let answer = self
                    .staged
                    .get(index)
                    .or_else(|| self.record.answers.get(index))
                    .cloned()
                    .unwrap_or_default();
                Some(ShownQuestion {
                    number: position + 1,
                    index,
                    question: question.clone(),
                    answer,
                })
            })
            .collect()
    }

    /// How long the host should wait before calling [`StudentClient::tick`]
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.ticker.next_wakeup(self.context.now())
    }
}
