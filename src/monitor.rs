//! Teacher-side live aggregation
//!
//! The monitor folds the stream of participant records of one test into a
//! [`Roster`] and derives counts, per-student progress and live scores from
//! it. Nothing is cached across renders except the records themselves: the
//! phase label in particular is recomputed against the clock on every call
//! to [`Monitor::view`]. [`TestList`] does the same for every test of one
//! teacher at once.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
};

use derive_more::Display;
use itertools::Itertools;
use serde::Serialize;
use serde_with::{DurationMilliSeconds, TimestampMilliSeconds, serde_as, skip_serializing_none};
use web_time::{Duration, SystemTime};

use crate::{
    identity::TeacherId,
    join_code::JoinCode,
    lifecycle::Status,
    participant::{ParticipantRecord, Presence, PresenceKind, Roster, StudentId},
    quiz::TestRecord,
    scoring::{self, Score},
    session::{SessionContext, WatchId},
    store::{self, DocPath, Document, Query, Snapshot, Target, path},
    timer::Countdown,
};

/// Human label for where a test is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Phase {
    /// Published, not started
    Pending,
    /// Active, at most half of the time elapsed
    Started,
    /// Active, more than half of the time elapsed
    Midway,
    /// Ended
    Ended,
}

impl Phase {
    /// Derives the phase of a test at `now`
    ///
    /// An active test past its deadline stays `Midway` until the teacher
    /// ends it.
    pub fn at(status: Status, countdown: Option<Countdown>, now: SystemTime) -> Self {
        match status {
            Status::Pending => Self::Pending,
            Status::Ended => Self::Ended,
            Status::Active => match countdown {
                Some(countdown) if countdown.past_halfway(now) => Self::Midway,
                _ => Self::Started,
            },
        }
    }

    /// Derives the phase of a stored test at `now`
    pub fn of(test: &TestRecord, now: SystemTime) -> Self {
        Self::at(test.status, countdown_of(test), now)
    }
}

fn countdown_of(test: &TestRecord) -> Option<Countdown> {
    test.started_at
        .map(|started_at| Countdown::new(started_at, test.quiz.time_limit()))
}

/// Participant counts of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    /// Students latched to `Submitted`
    pub submitted: usize,
    /// Students not yet submitted, in or out of the tab
    pub active: usize,
    /// The subset of `active` currently out of the tab
    pub out_of_tab: usize,
    /// Students who joined and are waiting for the start
    pub waiting: usize,
}

impl Counts {
    /// Counts the students of `roster` for a test in `status`
    pub fn tally(roster: &Roster, status: Status) -> Self {
        let active = roster.specific_count(PresenceKind::Active);
        Self {
            submitted: roster.specific_count(PresenceKind::Submitted),
            active,
            out_of_tab: roster
                .specific_iter(PresenceKind::Active)
                .filter(|(_, record)| record.tab_status == Presence::OutOfTab)
                .count(),
            waiting: if status == Status::Pending { active } else { 0 },
        }
    }
}

/// One line of the monitor's student list
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentRow {
    /// The student
    pub id: StudentId,
    /// Display name
    pub name: String,
    /// Current presence
    pub presence: Presence,
    /// Questions with a non-empty answer
    pub answered: usize,
    /// Questions in the test
    pub question_count: usize,
    /// Live score, hidden while the test is pending
    pub score: Option<Score>,
}

/// Everything the teacher's monitor screen shows
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorView {
    /// The monitored test
    pub code: JoinCode,
    /// Title, empty until the test document has been received
    pub title: String,
    /// Lifecycle state
    pub status: Status,
    /// Phase label at the time of the view
    pub phase: Phase,
    /// Time left while active
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub remaining: Option<Duration>,
    /// Participant counts
    pub counts: Counts,
    /// Students sorted by name
    pub students: Vec<StudentRow>,
    /// The test document has been deleted
    pub removed: bool,
}

/// Correct answers per question among submitted students
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QuestionStats {
    /// Students who got the question right
    pub correct: usize,
    /// Submitted students
    pub total: usize,
}

/// Per-question statistics of a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// One entry per question, in canonical order
    pub questions: Vec<QuestionStats>,
}

/// One entry of the teacher's test list
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestListing {
    /// Join code
    pub code: JoinCode,
    /// Title
    pub title: String,
    /// Time limit in minutes
    pub duration: u32,
    /// When the test was first published
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    /// Lifecycle state
    pub status: Status,
    /// Phase at the time of listing
    pub phase: Phase,
    /// Participant counts
    pub counts: Counts,
}

impl TestListing {
    pub(crate) fn new(code: JoinCode, test: &TestRecord, roster: &Roster, now: SystemTime) -> Self {
        Self {
            code,
            title: test.quiz.title.clone(),
            duration: test.quiz.duration,
            created_at: test.created_at,
            status: test.status,
            phase: Phase::of(test, now),
            counts: Counts::tally(roster, test.status),
        }
    }
}

/// Query selecting the tests of `teacher`, newest first
pub(crate) fn tests_query(teacher: &TeacherId) -> Query {
    Query::all(path::tests())
        .filter("teacherId", teacher.as_str())
        .order_by("createdAt", true)
}

/// Decodes tests from a query result, skipping bad entries
pub(crate) fn decode_tests(
    docs: Vec<(DocPath, Document)>,
) -> impl Iterator<Item = (JoinCode, TestRecord)> {
    docs.into_iter().filter_map(|(path, doc)| {
        let Ok(code) = path.id().parse::<JoinCode>() else {
            tracing::warn!(%path, "skipping test with malformed code");
            return None;
        };
        match store::decode::<TestRecord>(doc) {
            Ok(test) => Some((code, test)),
            Err(error) => {
                tracing::warn!(%code, %error, "skipping malformed test");
                None
            }
        }
    })
}

/// Decodes participant records from a query result, skipping bad entries
pub(crate) fn decode_records(
    docs: Vec<(DocPath, Document)>,
) -> impl Iterator<Item = (StudentId, ParticipantRecord)> {
    docs.into_iter().filter_map(|(path, doc)| {
        let Ok(id) = StudentId::from_str(path.id()) else {
            tracing::warn!(%path, "skipping participant with malformed id");
            return None;
        };
        match store::decode::<ParticipantRecord>(doc) {
            Ok(record) => Some((id, record)),
            Err(error) => {
                tracing::warn!(%path, %error, "skipping malformed participant record");
                None
            }
        }
    })
}

/// Query selecting the participant records of `code`
pub(crate) fn responses_query(code: JoinCode) -> Query {
    Query::all(path::responses(code)).filter("testCode", code.to_string())
}

/// Live view over one test and its participants
///
/// The monitor owns its subscriptions; dropping it unsubscribes.
#[derive(Debug)]
pub struct Monitor {
    context: SessionContext,
    code: JoinCode,
    test_watch: WatchId,
    responses_watch: WatchId,
    test: Option<TestRecord>,
    roster: Roster,
    removed: bool,
}

impl Monitor {
    /// Subscribes to the test document and its participant records
    ///
    /// # Errors
    ///
    /// Returns the store error if a subscription cannot be opened.
    pub fn open(mut context: SessionContext, code: JoinCode) -> Result<Self, store::Error> {
        let test_watch = context.watch(Target::Document(path::test(code)))?;
        let responses_watch = context.watch(Target::Query(responses_query(code)))?;
        let mut monitor = Self {
            context,
            code,
            test_watch,
            responses_watch,
            test: None,
            roster: Roster::default(),
            removed: false,
        };
        monitor.pump();
        Ok(monitor)
    }

    /// Applies every notification received since the last call
    ///
    /// # Returns
    ///
    /// `true` if anything was applied
    pub fn pump(&mut self) -> bool {
        let snapshots = self.context.drain();
        let changed = !snapshots.is_empty();
        for (id, snapshot) in snapshots {
            match snapshot {
                Snapshot::Document(Some(doc)) if id == self.test_watch => {
                    match store::decode::<TestRecord>(doc) {
                        Ok(test) => {
                            self.test = Some(test);
                            self.removed = false;
                        }
                        Err(error) => {
                            tracing::warn!(code = %self.code, %error, "ignoring malformed test");
                        }
                    }
                }
                Snapshot::Document(None) if id == self.test_watch => {
                    self.test = None;
                    self.removed = true;
                }
                Snapshot::Query(docs) if id == self.responses_watch => {
                    self.roster = decode_records(docs).collect();
                }
                _ => {}
            }
        }
        changed
    }

    /// The monitored test
    pub fn code(&self) -> JoinCode {
        self.code
    }

    /// The latest test document, if received
    pub fn test(&self) -> Option<&TestRecord> {
        self.test.as_ref()
    }

    /// The folded participant records
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Derives the current view against the clock
    pub fn view(&self) -> MonitorView {
        let now = self.context.now();
        let status = self.test.as_ref().map_or(Status::Pending, |t| t.status);
        let questions = self
            .test
            .as_ref()
            .map_or(&[][..], |t| t.quiz.questions.as_slice());

        let students = self
            .roster
            .iter()
            .map(|(id, record)| StudentRow {
                id,
                name: record.name.clone(),
                presence: record.tab_status,
                answered: record.answers.answered_count(),
                question_count: questions.len(),
                score: status
                    .is_revealed()
                    .then(|| scoring::score(questions, &record.answers)),
            })
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            .collect_vec();

        let countdown = self.test.as_ref().and_then(countdown_of);
        MonitorView {
            code: self.code,
            title: self
                .test
                .as_ref()
                .map(|t| t.quiz.title.clone())
                .unwrap_or_default(),
            status,
            phase: self
                .test
                .as_ref()
                .map_or(Phase::Pending, |t| Phase::of(t, now)),
            remaining: countdown
                .filter(|_| status == Status::Active)
                .map(|c| c.remaining(now)),
            counts: Counts::tally(&self.roster, status),
            students,
            removed: self.removed,
        }
    }

    /// Per-question results over submitted students
    ///
    /// `None` until the test has started.
    pub fn summary(&self) -> Option<Summary> {
        let test = self.test.as_ref().filter(|t| t.status.is_revealed())?;
        let mut questions = vec![QuestionStats::default(); test.quiz.len()];
        for (_, record) in self.roster.specific_iter(PresenceKind::Submitted) {
            let grades = scoring::grade(&test.quiz.questions, &record.answers);
            for (stats, right) in questions.iter_mut().zip(grades) {
                stats.total += 1;
                if right {
                    stats.correct += 1;
                }
            }
        }
        Some(Summary { questions })
    }
}

/// Live list of one teacher's tests
///
/// Watches the teacher's tests and, for every listed test, its participant
/// records. Participant watches follow the tests as they are published and
/// deleted. Dropping the list unsubscribes.
#[derive(Debug)]
pub struct TestList {
    context: SessionContext,
    query: Query,
    tests_watch: WatchId,
    tests: Vec<(JoinCode, TestRecord)>,
    rosters: HashMap<JoinCode, (WatchId, Roster)>,
}

impl TestList {
    /// Subscribes to the tests of `teacher`
    ///
    /// Watches the tests unordered and sorts them locally when the store
    /// cannot order the query.
    ///
    /// # Errors
    ///
    /// Returns the store error if the tests cannot be watched.
    pub fn open(mut context: SessionContext, teacher: &TeacherId) -> Result<Self, store::Error> {
        let query = tests_query(teacher);
        let tests_watch = match context.watch(Target::Query(query.clone())) {
            Err(store::Error::QueryUnsupported { collection, field }) => {
                tracing::debug!(%collection, %field, "ordered watch unsupported, sorting locally");
                context.watch(Target::Query(Query {
                    order_by: None,
                    ..query.clone()
                }))?
            }
            watch => watch?,
        };
        let mut list = Self {
            context,
            query,
            tests_watch,
            tests: Vec::new(),
            rosters: HashMap::new(),
        };
        list.pump();
        Ok(list)
    }

    /// Applies every notification received since the last call
    ///
    /// # Returns
    ///
    /// `true` if anything was applied
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        self.follow_tests();
        loop {
            let snapshots = self.context.drain();
            if snapshots.is_empty() {
                return changed;
            }
            changed = true;
            for (id, snapshot) in snapshots {
                match snapshot {
                    Snapshot::Query(mut docs) if id == self.tests_watch => {
                        self.query.sort(&mut docs);
                        self.tests = decode_tests(docs).collect();
                        self.follow_tests();
                    }
                    Snapshot::Query(docs) => {
                        if let Some((_, roster)) =
                            self.rosters.values_mut().find(|(watch, _)| *watch == id)
                        {
                            *roster = decode_records(docs).collect();
                        }
                    }
                    Snapshot::Document(_) => {}
                }
            }
        }
    }

    /// Watches the participants of newly listed tests and drops the rest
    fn follow_tests(&mut self) {
        let listed: HashSet<JoinCode> = self.tests.iter().map(|(code, _)| *code).collect();
        let gone = self
            .rosters
            .keys()
            .filter(|code| !listed.contains(code))
            .copied()
            .collect_vec();
        for code in gone {
            if let Some((watch, _)) = self.rosters.remove(&code) {
                self.context.unwatch(watch);
            }
        }
        for code in listed {
            if self.rosters.contains_key(&code) {
                continue;
            }
            match self.context.watch(Target::Query(responses_query(code))) {
                Ok(watch) => {
                    self.rosters.insert(code, (watch, Roster::default()));
                }
                Err(error) => {
                    tracing::warn!(%code, %error, "cannot watch participants, will retry");
                }
            }
        }
    }

    /// Derives the listing against the clock, newest test first
    pub fn view(&self) -> Vec<TestListing> {
        let now = self.context.now();
        let empty = Roster::default();
        self.tests
            .iter()
            .map(|(code, test)| {
                let roster = self.rosters.get(code).map_or(&empty, |(_, roster)| roster);
                TestListing::new(*code, test, roster, now)
            })
            .collect()
    }
}
