//! Scenario tests: one teacher and several students sharing a store.
//!
//! Every scenario runs against the in-process store with a manual clock, so
//! deadlines and phase labels land on exact milliseconds.

use std::sync::Arc;

use serde_json::json;
use testroom::{
    JoinCode, SessionContext, Status, StudentClient, TeacherConsole,
    clock::ManualClock,
    config::Options,
    identity::StaticIdentity,
    monitor::Phase,
    quiz::{Answer, CorrectAnswer, Question, QuestionKind, Quiz},
    scoring::Score,
    store::{DocumentStore, MemoryStore, Query, memory::Entry, path},
    student::{StudentScreen, SubmitOutcome, SyncOutcome},
    teacher::{self, Republish},
};
use web_time::Duration;

const T0: u64 = 1_700_000_000_000;

struct Classroom {
    clock: ManualClock,
    store: MemoryStore,
}

impl Classroom {
    fn new() -> Self {
        let clock = ManualClock::at_millis(T0);
        let store = MemoryStore::new(Arc::new(clock.clone()));
        Self { clock, store }
    }

    fn context(&self) -> SessionContext {
        SessionContext::new(
            Arc::new(self.store.clone()),
            Arc::new(self.clock.clone()),
            Options {
                shuffle_seed: Some(2024),
                ..Options::default()
            },
        )
    }

    fn teacher(&self) -> TeacherConsole {
        TeacherConsole::new(self.context(), Arc::new(StaticIdentity("ms-lovelace".into())))
    }

    fn student(&self, name: &str, code: JoinCode) -> StudentClient {
        StudentClient::join(self.context(), name, &code.to_string()).unwrap()
    }

    fn advance_to(&self, millis_after_start: u64) {
        self.clock
            .set(web_time::SystemTime::UNIX_EPOCH + Duration::from_millis(T0 + millis_after_start));
    }

    /// Writes that latched `Submitted` for one student
    fn submissions_of(&self, client: &StudentClient) -> usize {
        let target = path::response(client.code(), client.id());
        self.store
            .journal()
            .iter()
            .filter(|entry| match entry {
                Entry::Set { path, doc, .. } => {
                    *path == target && doc.get("tabStatus") == Some(&json!("Submitted"))
                }
                Entry::Delete { .. } => false,
            })
            .count()
    }
}

fn two_questions() -> Quiz {
    Quiz {
        title: "Week 3 check-in".to_string(),
        duration: 10,
        questions: vec![
            Question {
                text: "Which is prime?".to_string(),
                kind: QuestionKind::Single,
                options: vec!["4".into(), "7".into(), "9".into()],
                correct_answer: CorrectAnswer::One(1),
                required: true,
            },
            Question {
                text: "Which are even?".to_string(),
                kind: QuestionKind::Multi,
                options: vec!["3".into(), "4".into(), "8".into()],
                correct_answer: CorrectAnswer::Many([1, 2].into()),
                required: false,
            },
        ],
    }
}

#[test]
fn test_student_scores_full_marks() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);

    teacher.start(code).unwrap();
    student.pump();
    student.set_answer(0, Answer::Single(1)).unwrap();
    student.set_answer(1, Answer::multi([2, 1])).unwrap();
    assert_eq!(student.submit(), SubmitOutcome::Submitted);

    let expected = Score {
        correct: 2,
        wrong: 0,
        total: 2,
    };
    assert_eq!(student.results().unwrap(), expected);

    let mut monitor = teacher.monitor(code).unwrap();
    monitor.pump();
    let view = monitor.view();
    assert_eq!(view.counts.submitted, 1);
    assert_eq!(view.students[0].name, "Grace");
    assert_eq!(view.students[0].answered, 2);
    assert_eq!(view.students[0].score, Some(expected));

    let summary = monitor.summary().unwrap();
    assert!(summary.questions.iter().all(|q| q.correct == 1 && q.total == 1));
}

#[test]
fn test_phase_labels_and_deadline() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut monitor = teacher.monitor(code).unwrap();
    let mut student = room.student("Grace", code);

    monitor.pump();
    assert_eq!(monitor.view().phase, Phase::Pending);
    assert_eq!(monitor.view().counts.waiting, 1);
    assert_eq!(monitor.view().students[0].score, None);

    teacher.start(code).unwrap();
    student.pump();
    monitor.pump();

    room.advance_to(300_000);
    assert_eq!(monitor.view().phase, Phase::Started);
    room.advance_to(300_001);
    assert_eq!(monitor.view().phase, Phase::Midway);

    room.advance_to(599_999);
    student.tick();
    assert!(!student.is_submitted());

    room.advance_to(600_000);
    student.tick();
    student.tick();
    assert!(student.is_submitted());
    assert_eq!(room.submissions_of(&student), 1);

    monitor.pump();
    let view = monitor.view();
    assert_eq!(view.counts.submitted, 1);
    assert_eq!(view.counts.active, 0);
    assert_eq!(view.remaining, Some(Duration::ZERO));
    assert_eq!(view.phase, Phase::Midway);

    teacher.end(code).unwrap();
    monitor.pump();
    assert_eq!(monitor.view().phase, Phase::Ended);
}

#[test]
fn test_submission_paths_race_to_one_write() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    teacher.start(code).unwrap();
    student.pump();

    student.stage(0, Answer::Single(1)).unwrap();
    room.advance_to(600_000);
    assert_eq!(student.submit(), SubmitOutcome::Submitted);
    student.tick();
    teacher.end(code).unwrap();
    student.pump();
    assert_eq!(student.submit(), SubmitOutcome::AlreadySubmitted);

    assert_eq!(room.submissions_of(&student), 1);
    assert_eq!(student.results().unwrap().correct, 1);
}

#[test]
fn test_end_submits_every_active_student() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut students: Vec<_> = ["Ada", "Alan", "Edsger"]
        .into_iter()
        .map(|name| room.student(name, code))
        .collect();

    teacher.start(code).unwrap();
    for student in &mut students {
        student.pump();
    }
    students[0].set_visibility(false);
    assert_eq!(students[1].submit(), SubmitOutcome::Submitted);

    teacher.end(code).unwrap();
    for student in &mut students {
        student.pump();
        assert!(student.is_submitted());
        assert_eq!(room.submissions_of(student), 1);
    }
}

#[test]
fn test_concurrent_students() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    teacher.start(code).unwrap();

    std::thread::scope(|scope| {
        for n in 0..8 {
            let room = &room;
            scope.spawn(move || {
                let mut student = room.student(&format!("Student {n}"), code);
                student.set_answer(0, Answer::Single(n % 3)).unwrap();
                student.set_visibility(n % 2 == 0);
                student.set_answer(1, Answer::multi([1, 2])).unwrap();
                assert_eq!(student.submit(), SubmitOutcome::Submitted);
            });
        }
    });

    let mut monitor = teacher.monitor(code).unwrap();
    monitor.pump();
    let view = monitor.view();
    assert_eq!(view.counts.submitted, 8);
    assert_eq!(view.students.len(), 8);
    assert!(view.students.iter().all(|row| row.answered == 2));
    let full_marks = view
        .students
        .iter()
        .filter(|row| row.score.is_some_and(|score| score.correct == 2))
        .count();
    assert_eq!(full_marks, 3);
}

#[test]
fn test_reconnect_keeps_order_and_countdown() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    teacher.start(code).unwrap();

    let mut first = room.student("Grace", code);
    first.set_answer(1, Answer::multi([1])).unwrap();
    let id = first.id();
    let order = first.record().order.clone();
    drop(first);

    room.advance_to(120_000);
    let mut again = StudentClient::join_as(
        room.context(),
        id,
        "Grace",
        &code.to_string(),
        fastrand::Rng::with_seed(7),
    )
    .unwrap();
    assert_eq!(again.record().order, order);
    assert_eq!(again.tick(), Some(Duration::from_secs(480)));
    let StudentScreen::Questions { questions, .. } = again.screen() else {
        panic!("questions should be shown after reconnecting");
    };
    let second = questions.iter().find(|shown| shown.index == 1).unwrap();
    assert_eq!(second.answer, Answer::multi([1]));
}

#[test]
fn test_list_tests_without_ordered_queries() {
    let room = Classroom::new();
    let store = room.store.clone().without_ordered_queries();
    let context = SessionContext::new(
        Arc::new(store),
        Arc::new(room.clock.clone()),
        Options::default(),
    );
    let mut teacher = TeacherConsole::new(context, Arc::new(StaticIdentity("ms-lovelace".into())));

    let first = teacher.publish(&two_questions()).unwrap();
    room.advance_to(1_000);
    let second = teacher.publish(&two_questions()).unwrap();
    room.student("Grace", first);

    let listings = teacher.list_tests().unwrap();
    assert_eq!(
        listings.iter().map(|l| l.code).collect::<Vec<_>>(),
        [second, first]
    );
    assert_eq!(listings[1].counts.waiting, 1);
    assert_eq!(listings[1].status, Status::Pending);
}

#[test]
fn test_republish_needs_confirmation_and_reshuffles() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    teacher.start(code).unwrap();
    student.pump();

    let mut longer = two_questions();
    longer.questions.push(Question {
        text: "Which is odd?".to_string(),
        kind: QuestionKind::Dropdown,
        options: vec!["2".into(), "5".into()],
        correct_answer: CorrectAnswer::One(1),
        required: false,
    });
    assert!(matches!(
        teacher.republish(code, &longer, Republish::IfPending),
        Err(teacher::Error::RequiresConfirmation { .. })
    ));
    teacher
        .republish(code, &longer, Republish::ResetSession)
        .unwrap();

    student.pump();
    assert!(matches!(student.screen(), StudentScreen::Waiting { .. }));
    assert!(student.record().order.is_permutation_of(3));
    let stored = room
        .store
        .get(&path::response(code, student.id()))
        .unwrap()
        .unwrap();
    assert_eq!(stored["order"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_delete_cascades_to_students() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    room.student("Alan", code);
    let mut monitor = teacher.monitor(code).unwrap();

    assert_eq!(teacher.delete(code).unwrap(), 2);
    assert!(
        room.store
            .query(&Query::all(path::responses(code)))
            .unwrap()
            .is_empty()
    );

    student.pump();
    assert_eq!(student.screen(), StudentScreen::Removed);
    monitor.pump();
    assert!(monitor.view().removed);
    assert!(teacher.list_tests().unwrap().is_empty());
}

#[test]
fn test_start_and_end_seen_together_still_submit() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    let mut monitor = teacher.monitor(code).unwrap();

    teacher.start(code).unwrap();
    teacher.end(code).unwrap();
    assert!(student.pump());

    assert!(student.is_submitted());
    assert_eq!(student.screen(), StudentScreen::Closed);
    assert_eq!(room.submissions_of(&student), 1);

    monitor.pump();
    let view = monitor.view();
    assert_eq!(view.phase, Phase::Ended);
    assert_eq!(view.counts.submitted, 1);
    assert_eq!(view.counts.active, 0);
}

#[test]
fn test_student_writes_nothing_after_delete() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    teacher.start(code).unwrap();
    student.pump();

    teacher.delete(code).unwrap();
    let writes = room.store.journal().len();
    student.pump();
    assert_eq!(student.set_visibility(false), SyncOutcome::Stale);
    assert_eq!(student.submit(), SubmitOutcome::Removed);
    room.advance_to(600_000);
    student.tick();

    let response = path::response(code, student.id());
    assert_eq!(room.store.get(&response).unwrap(), None);
    assert_eq!(room.store.journal().len(), writes);
    assert_eq!(student.screen(), StudentScreen::Removed);
}

#[test]
fn test_offline_submission_is_retried_by_tick() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut student = room.student("Grace", code);
    teacher.start(code).unwrap();
    student.pump();
    student.set_answer(0, Answer::Single(1)).unwrap();

    room.store.set_offline(true);
    student.stage(1, Answer::multi([1, 2])).unwrap();
    assert_eq!(student.submit(), SubmitOutcome::Deferred);
    assert!(student.is_submitted());
    assert_eq!(student.submit(), SubmitOutcome::Deferred);
    student.tick();
    assert_eq!(room.submissions_of(&student), 0);

    room.store.set_offline(false);
    room.advance_to(1_000);
    student.tick();
    assert_eq!(room.submissions_of(&student), 1);
    assert_eq!(student.submit(), SubmitOutcome::AlreadySubmitted);
    student.tick();
    assert_eq!(room.submissions_of(&student), 1);

    let mut monitor = teacher.monitor(code).unwrap();
    monitor.pump();
    let view = monitor.view();
    assert_eq!(view.counts.submitted, 1);
    assert_eq!(view.students[0].answered, 2);
    assert_eq!(student.results().unwrap().correct, 2);
}

#[test]
fn test_teacher_list_updates_live() {
    let room = Classroom::new();
    let mut teacher = room.teacher();
    let code = teacher.publish(&two_questions()).unwrap();
    let mut list = teacher.watch_tests().unwrap();
    let mut student = room.student("Grace", code);

    list.pump();
    assert_eq!(list.view()[0].counts.waiting, 1);

    teacher.start(code).unwrap();
    student.pump();
    student.set_visibility(false);
    assert!(list.pump());
    let listing = &list.view()[0];
    assert_eq!(listing.status, Status::Active);
    assert_eq!(listing.counts.out_of_tab, 1);

    room.advance_to(300_001);
    assert_eq!(list.view()[0].phase, Phase::Midway);

    teacher.end(code).unwrap();
    student.pump();
    list.pump();
    let listing = &list.view()[0];
    assert_eq!(listing.phase, Phase::Ended);
    assert_eq!(listing.counts.submitted, 1);
}
