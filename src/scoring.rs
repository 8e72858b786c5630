//! Scoring of submitted answers
//!
//! Scores are always computed from the canonical [`Question`]s held in the
//! test document, never from anything a student client sent back.

use serde::{Deserialize, Serialize};

use crate::quiz::{Answers, Question};

/// Aggregate result for one student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Score {
    /// Questions answered exactly right
    pub correct: usize,
    /// Questions answered wrong or left unanswered
    pub wrong: usize,
    /// Number of questions in the test
    pub total: usize,
}

impl Score {
    /// Builds a score from per-question correctness
    pub fn from_grades<I: IntoIterator<Item = bool>>(grades: I) -> Self {
        grades.into_iter().fold(Self::default(), |mut score, right| {
            if right {
                score.correct += 1;
            } else {
                score.wrong += 1;
            }
            score.total += 1;
            score
        })
    }
}

/// Grades every question in canonical order
///
/// A question without a recorded answer is graded wrong. Answers keyed by
/// an index past the last question are ignored.
pub fn grade(questions: &[Question], answers: &Answers) -> Vec<bool> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            answers
                .get(index)
                .is_some_and(|answer| question.is_correct(answer))
        })
        .collect()
}

/// Scores a student's answers against the canonical questions
pub fn score(questions: &[Question], answers: &Answers) -> Score {
    Score::from_grades(grade(questions, answers))
}
