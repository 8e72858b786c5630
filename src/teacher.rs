//! Teacher console
//!
//! The teacher authors tests, publishes them under a join code and drives
//! their lifecycle. Every transition is checked against the pure state
//! machine in [`crate::lifecycle`] before anything is written, and the start
//! instant comes from the store's clock rather than the teacher's device.

use std::sync::Arc;

use garde::Validate;
use serde::Serialize;
use serde_with::{TimestampMilliSeconds, serde_as, skip_serializing_none};
use thiserror::Error;
use tracing::info;
use web_time::SystemTime;

use crate::{
    identity::{IdentityProvider, TeacherId},
    join_code::JoinCode,
    lifecycle::{self, Status, Step, Transition},
    monitor::{self, Monitor, TestList, TestListing},
    participant::Roster,
    quiz::{Quiz, TestRecord},
    session::SessionContext,
    store::{self, DocumentStore, Query, Write, path},
};

/// Errors surfaced to the teacher
#[derive(Error, Debug)]
pub enum Error {
    /// No test is stored under the code
    #[error("no test with join code {0}")]
    NotFound(JoinCode),
    /// The test belongs to someone else
    #[error("test {0} belongs to another teacher")]
    NotOwner(JoinCode),
    /// The authored test is invalid; nothing was written
    #[error("test is invalid: {0}")]
    Validation(#[from] garde::Report),
    /// Republishing would reset a session that already started
    #[error("test {code} is {status}, republishing resets its session")]
    RequiresConfirmation {
        /// The test being republished
        code: JoinCode,
        /// Its current status
        status: Status,
    },
    /// The lifecycle transition is not allowed
    #[error(transparent)]
    Transition(#[from] lifecycle::Error),
    /// No unused join code was found
    #[error("no unused join code found after {0} attempts")]
    CodeSpaceExhausted(usize),
    /// The store failed
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// How to treat a test whose session already started when republishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Republish {
    /// Only republish tests that are still pending
    #[default]
    IfPending,
    /// Reset an active or ended test back to pending
    ResetSession,
}

/// The lifecycle fields written by `start` and `end`
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate {
    status: Status,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    started_at: Option<SystemTime>,
}

/// Publishing and session control for one signed-in teacher
pub struct TeacherConsole {
    context: SessionContext,
    identity: Arc<dyn IdentityProvider>,
    codes: fastrand::Rng,
}

impl std::fmt::Debug for TeacherConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeacherConsole")
            .field("teacher", &self.identity.teacher_id())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl TeacherConsole {
    /// Creates a console acting for the teacher reported by `identity`
    pub fn new(context: SessionContext, identity: Arc<dyn IdentityProvider>) -> Self {
        let codes = context.options().code_rng();
        Self {
            context,
            identity,
            codes,
        }
    }

    /// The signed-in teacher
    pub fn teacher_id(&self) -> TeacherId {
        self.identity.teacher_id()
    }

    fn store(&self) -> &dyn DocumentStore {
        self.context.store()
    }

    fn prepare(quiz: &Quiz) -> Result<Quiz, Error> {
        let quiz = quiz.trimmed();
        quiz.validate()?;
        Ok(quiz)
    }

    fn fetch(&self, code: JoinCode) -> Result<TestRecord, Error> {
        let doc = self
            .store()
            .get(&path::test(code))?
            .ok_or(Error::NotFound(code))?;
        let test: TestRecord = store::decode(doc)?;
        if test.teacher_id != self.teacher_id() {
            return Err(Error::NotOwner(code));
        }
        Ok(test)
    }

    fn write_test(&self, code: JoinCode, quiz: Quiz) -> Result<(), Error> {
        let record = TestRecord {
            quiz,
            teacher_id: self.teacher_id(),
            created_at: self.store().server_time(),
            status: Status::Pending,
            started_at: None,
        };
        self.store()
            .set(&path::test(code), store::encode(&record)?, Write::Replace)?;
        Ok(())
    }

    fn unused_code(&mut self) -> Result<JoinCode, Error> {
        let attempts = self.context.options().code_attempts;
        for _ in 0..attempts {
            let code = JoinCode::from_rng(&mut self.codes);
            if self.context.store().get(&path::test(code))?.is_none() {
                return Ok(code);
            }
            tracing::debug!(%code, "join code taken, drawing another");
        }
        Err(Error::CodeSpaceExhausted(attempts))
    }

    /// Publishes a new test under a fresh join code
    ///
    /// The test is trimmed, validated and stored as `pending`.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - The test is invalid; nothing is written
    /// * `Error::CodeSpaceExhausted` - Every drawn code was already taken
    /// * `Error::Store` - The store failed
    pub fn publish(&mut self, quiz: &Quiz) -> Result<JoinCode, Error> {
        let quiz = Self::prepare(quiz)?;
        let code = self.unused_code()?;
        let questions = quiz.len();
        self.write_test(code, quiz)?;
        info!(%code, questions, "published test");
        Ok(code)
    }

    /// Loads a published test for editing
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::NotOwner` if the test cannot be
    /// edited by this teacher.
    pub fn load(&self, code: JoinCode) -> Result<Quiz, Error> {
        Ok(self.fetch(code)?.quiz)
    }

    /// Replaces a published test under the same join code
    ///
    /// The test always goes back to `pending` without a start instant.
    /// Participant records are kept.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - The test is invalid; nothing is written
    /// * `Error::NotFound` / `Error::NotOwner` - The code cannot be edited
    /// * `Error::RequiresConfirmation` - The test already started and
    ///   `confirm` is not `Republish::ResetSession`
    pub fn republish(&self, code: JoinCode, quiz: &Quiz, confirm: Republish) -> Result<(), Error> {
        let quiz = Self::prepare(quiz)?;
        let existing = self.fetch(code)?;
        if existing.status != Status::Pending && confirm != Republish::ResetSession {
            return Err(Error::RequiresConfirmation {
                code,
                status: existing.status,
            });
        }
        self.write_test(code, quiz)?;
        info!(%code, previous = %existing.status, "republished test");
        Ok(())
    }

    /// Starts a pending test
    ///
    /// # Returns
    ///
    /// The authoritative start instant
    ///
    /// # Errors
    ///
    /// Returns `Error::Transition` unless the test is pending.
    pub fn start(&self, code: JoinCode) -> Result<SystemTime, Error> {
        let test = self.fetch(code)?;
        let Step::Advance(status) = test.status.apply(Transition::Start)? else {
            return Err(lifecycle::Error::Invalid {
                from: test.status,
                transition: Transition::Start,
            }
            .into());
        };
        let started_at = self.store().server_time();
        let update = StatusUpdate {
            status,
            started_at: Some(started_at),
        };
        self.store()
            .set(&path::test(code), store::encode(&update)?, Write::Merge)?;
        info!(%code, "started test");
        Ok(started_at)
    }

    /// Ends an active test; ending an ended test does nothing
    ///
    /// # Errors
    ///
    /// Returns `Error::Transition` if the test is still pending.
    pub fn end(&self, code: JoinCode) -> Result<(), Error> {
        let test = self.fetch(code)?;
        match test.status.apply(Transition::End)? {
            Step::Advance(status) => {
                let update = StatusUpdate {
                    status,
                    started_at: None,
                };
                self.store()
                    .set(&path::test(code), store::encode(&update)?, Write::Merge)?;
                info!(%code, "ended test");
            }
            Step::Unchanged => tracing::debug!(%code, "test already ended"),
        }
        Ok(())
    }

    /// Deletes a test together with all of its participant records
    ///
    /// # Returns
    ///
    /// The number of participant records removed
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::NotOwner` if the test cannot be
    /// deleted by this teacher.
    pub fn delete(&self, code: JoinCode) -> Result<usize, Error> {
        self.fetch(code)?;
        self.store().delete(&path::test(code))?;
        let responses = self.store().query(&Query::all(path::responses(code)))?;
        for (response, _) in &responses {
            self.store().delete(response)?;
        }
        info!(%code, responses = responses.len(), "deleted test");
        Ok(responses.len())
    }

    /// Lists this teacher's tests, newest first
    ///
    /// Each entry carries its live participant counts and phase. Falls back
    /// to an unordered scan sorted locally when the store cannot order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn list_tests(&self) -> Result<Vec<TestListing>, Error> {
        let query = monitor::tests_query(&self.teacher_id());
        let now = self.context.now();
        let mut listings = Vec::new();
        let tests = store::query_with_fallback(self.store(), &query)?;
        for (code, test) in monitor::decode_tests(tests) {
            let roster: Roster =
                monitor::decode_records(self.store().query(&monitor::responses_query(code))?)
                    .collect();
            listings.push(TestListing::new(code, &test, &roster, now));
        }
        Ok(listings)
    }

    /// Opens a live list of this teacher's tests
    ///
    /// The list follows status changes and participant counts of every
    /// listed test until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the tests cannot be watched.
    pub fn watch_tests(&self) -> Result<TestList, Error> {
        Ok(TestList::open(self.context.fork(), &self.teacher_id())?)
    }

    /// Opens a live monitor on one of this teacher's tests
    ///
    /// The monitor owns its subscriptions; drop it to stop monitoring.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::NotOwner` if the test cannot be
    /// monitored by this teacher.
    pub fn monitor(&self, code: JoinCode) -> Result<Monitor, Error> {
        self.fetch(code)?;
        Ok(Monitor::open(self.context.fork(), code)?)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        config::Options,
        identity::StaticIdentity,
        monitor::Phase,
        participant::{ParticipantRecord, Patch, Presence, StudentId},
        order::QuestionOrder,
        quiz::{CorrectAnswer, Question, QuestionKind},
        store::{MemoryStore, memory::Entry},
    };
    use web_time::Duration;

    const T0: u64 = 1_700_000_000_000;

    struct Fixture {
        clock: ManualClock,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::at_millis(T0);
            let store = MemoryStore::new(Arc::new(clock.clone()));
            Self { clock, store }
        }

        fn console_for(&self, store: MemoryStore, teacher: &str, options: Options) -> TeacherConsole {
            let context =
                SessionContext::new(Arc::new(store), Arc::new(self.clock.clone()), options);
            TeacherConsole::new(context, Arc::new(StaticIdentity(teacher.into())))
        }

        fn console(&self) -> TeacherConsole {
            self.console_for(self.store.clone(), "teacher-1", Options::default())
        }
    }

    fn quiz(title: &str) -> Quiz {
        Quiz {
            title: title.to_string(),
            duration: 10,
            questions: vec![Question {
                text: "2 + 2?".to_string(),
                kind: QuestionKind::Single,
                options: vec!["3".into(), "4".into()],
                correct_answer: CorrectAnswer::One(1),
                required: false,
            }],
        }
    }

    fn stored(fixture: &Fixture, code: JoinCode) -> TestRecord {
        store::decode(fixture.store.get(&path::test(code)).unwrap().unwrap()).unwrap()
    }

    fn join(fixture: &Fixture, code: JoinCode, presence: Presence) -> StudentId {
        let id = StudentId::new();
        let record = ParticipantRecord {
            name: "Student".to_string(),
            tab_status: presence,
            answers: Default::default(),
            order: QuestionOrder::identity(1),
            test_code: code,
        };
        fixture
            .store
            .set(
                &path::response(code, id),
                store::encode(&record).unwrap(),
                Write::Replace,
            )
            .unwrap();
        id
    }

    #[test]
    fn test_publish_writes_pending_test() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("  Arithmetic  ")).unwrap();

        let test = stored(&fixture, code);
        assert_eq!(test.quiz.title, "Arithmetic");
        assert_eq!(test.status, Status::Pending);
        assert_eq!(test.started_at, None);
        assert_eq!(test.teacher_id, "teacher-1".into());
        assert_eq!(test.created_at, SystemTime::UNIX_EPOCH + Duration::from_millis(T0));
    }

    #[test]
    fn test_publish_rejects_invalid_without_writing() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let mut bad = quiz("Arithmetic");
        bad.questions[0].options.truncate(1);

        assert!(matches!(console.publish(&bad), Err(Error::Validation(_))));
        assert!(fixture.store.journal().is_empty());
    }

    #[test]
    fn test_publish_skips_taken_codes() {
        let fixture = Fixture::new();
        let seeded = Options {
            shuffle_seed: Some(1),
            ..Options::default()
        };
        let first = fixture
            .console_for(fixture.store.clone(), "teacher-1", seeded.clone())
            .publish(&quiz("A"))
            .unwrap();
        let second = fixture
            .console_for(fixture.store.clone(), "teacher-1", seeded)
            .publish(&quiz("B"))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(stored(&fixture, first).quiz.title, "A");
    }

    #[test]
    fn test_publish_gives_up_when_codes_run_out() {
        let fixture = Fixture::new();
        let seeded = Options {
            shuffle_seed: Some(1),
            code_attempts: 1,
            ..Options::default()
        };
        fixture
            .console_for(fixture.store.clone(), "teacher-1", seeded.clone())
            .publish(&quiz("A"))
            .unwrap();
        let error = fixture
            .console_for(fixture.store.clone(), "teacher-1", seeded)
            .publish(&quiz("B"))
            .unwrap_err();
        assert!(matches!(error, Error::CodeSpaceExhausted(1)));
    }

    #[test]
    fn test_start_and_end() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();

        fixture.clock.advance(Duration::from_secs(30));
        let started_at = console.start(code).unwrap();
        let test = stored(&fixture, code);
        assert_eq!(test.status, Status::Active);
        assert_eq!(test.started_at, Some(started_at));
        assert_eq!(
            started_at,
            SystemTime::UNIX_EPOCH + Duration::from_millis(T0 + 30_000)
        );

        console.end(code).unwrap();
        let test = stored(&fixture, code);
        assert_eq!(test.status, Status::Ended);
        assert_eq!(test.started_at, Some(started_at));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();

        assert!(matches!(console.end(code), Err(Error::Transition(_))));
        console.start(code).unwrap();
        assert!(matches!(console.start(code), Err(Error::Transition(_))));
        console.end(code).unwrap();

        let writes = fixture.store.journal().len();
        console.end(code).unwrap();
        assert_eq!(fixture.store.journal().len(), writes);
        assert!(matches!(console.start(code), Err(Error::Transition(_))));
        assert_eq!(stored(&fixture, code).status, Status::Ended);
    }

    #[test]
    fn test_republish_requires_confirmation_once_started() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();
        console.republish(code, &quiz("A2"), Republish::IfPending).unwrap();
        assert_eq!(stored(&fixture, code).quiz.title, "A2");

        console.start(code).unwrap();
        let error = console
            .republish(code, &quiz("A3"), Republish::IfPending)
            .unwrap_err();
        assert!(matches!(
            error,
            Error::RequiresConfirmation {
                status: Status::Active,
                ..
            }
        ));

        let student = join(&fixture, code, Presence::Submitted);
        console
            .republish(code, &quiz("A3"), Republish::ResetSession)
            .unwrap();
        let test = stored(&fixture, code);
        assert_eq!(test.quiz.title, "A3");
        assert_eq!(test.status, Status::Pending);
        assert_eq!(test.started_at, None);
        assert!(
            fixture
                .store
                .get(&path::response(code, student))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_load_and_ownership() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("Mine")).unwrap();
        assert_eq!(console.load(code).unwrap().title, "Mine");

        let intruder = fixture.console_for(fixture.store.clone(), "teacher-2", Options::default());
        assert!(matches!(intruder.start(code), Err(Error::NotOwner(_))));
        assert!(matches!(intruder.delete(code), Err(Error::NotOwner(_))));

        let missing = JoinCode::try_from(if code.value() == 100_001 { 100_002 } else { 100_001 })
            .unwrap();
        assert!(matches!(console.load(missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_cascades() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();
        join(&fixture, code, Presence::Active);
        join(&fixture, code, Presence::Submitted);

        assert_eq!(console.delete(code).unwrap(), 2);
        assert!(fixture.store.get(&path::test(code)).unwrap().is_none());
        assert!(
            fixture
                .store
                .query(&Query::all(path::responses(code)))
                .unwrap()
                .is_empty()
        );
        assert!(matches!(console.delete(code), Err(Error::NotFound(_))));
        assert!(
            fixture
                .store
                .journal()
                .iter()
                .any(|entry| matches!(entry, Entry::Delete { .. }))
        );
    }

    #[test]
    fn test_list_tests_newest_first_with_counts() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let older = console.publish(&quiz("Older")).unwrap();
        fixture.clock.advance(Duration::from_secs(60));
        let newer = console.publish(&quiz("Newer")).unwrap();
        fixture
            .console_for(fixture.store.clone(), "teacher-2", Options::default())
            .publish(&quiz("Someone else's"))
            .unwrap();

        join(&fixture, older, Presence::Active);
        join(&fixture, older, Presence::Submitted);
        console.start(older).unwrap();

        let listings = console.list_tests().unwrap();
        let codes: Vec<_> = listings.iter().map(|l| l.code).collect();
        assert_eq!(codes, [newer, older]);
        assert_eq!(listings[1].phase, Phase::Started);
        assert_eq!(listings[1].counts.submitted, 1);
        assert_eq!(listings[1].counts.active, 1);
        assert_eq!(listings[0].phase, Phase::Pending);
    }

    #[test]
    fn test_list_tests_falls_back_without_ordering() {
        let fixture = Fixture::new();
        let store = fixture.store.clone().without_ordered_queries();
        let mut console = fixture.console_for(store, "teacher-1", Options::default());
        let older = console.publish(&quiz("Older")).unwrap();
        fixture.clock.advance(Duration::from_secs(60));
        let newer = console.publish(&quiz("Newer")).unwrap();

        let codes: Vec<_> = console.list_tests().unwrap().iter().map(|l| l.code).collect();
        assert_eq!(codes, [newer, older]);
    }

    #[test]
    fn test_watch_tests_follows_transitions() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();
        let student = join(&fixture, code, Presence::Active);
        let mut list = console.watch_tests().unwrap();
        assert_eq!(list.view()[0].counts.waiting, 1);

        console.start(code).unwrap();
        fixture
            .store
            .set(
                &path::response(code, student),
                store::encode(&Patch::presence(Presence::Submitted)).unwrap(),
                Write::Merge,
            )
            .unwrap();
        assert!(list.pump());

        let listing = &list.view()[0];
        assert_eq!(listing.status, Status::Active);
        assert_eq!(listing.phase, Phase::Started);
        assert_eq!(listing.counts.submitted, 1);
        assert_eq!(listing.counts.active, 0);

        fixture.clock.advance(Duration::from_secs(60));
        let newer = console.publish(&quiz("B")).unwrap();
        list.pump();
        let codes: Vec<_> = list.view().iter().map(|l| l.code).collect();
        assert_eq!(codes, [newer, code]);
    }

    #[test]
    fn test_monitor_requires_existing_test() {
        let fixture = Fixture::new();
        let mut console = fixture.console();
        let code = console.publish(&quiz("A")).unwrap();
        let monitor = console.monitor(code).unwrap();
        assert_eq!(monitor.view().title, "A");
        console.delete(code).unwrap();
        assert!(matches!(console.monitor(code), Err(Error::NotFound(_))));
    }
}
