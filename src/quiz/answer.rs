//! Student answers
//!
//! An answer is stored per question under the key `q<i>`, where `i` is the
//! question's index in the canonical test (not its shuffled position). On the
//! wire an answer is `null`, a single option index, or an array of indices.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A student's answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<AnswerRepr>", into = "Option<AnswerRepr>")]
pub enum Answer {
    /// Nothing selected
    #[default]
    Empty,
    /// One option selected (radio button or dropdown)
    Single(usize),
    /// A set of options selected (checkboxes)
    Multi(BTreeSet<usize>),
}

impl Answer {
    /// Creates a multi-select answer from indices in any order
    pub fn multi<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        Self::Multi(indices.into_iter().collect())
    }

    /// Whether anything is selected
    pub fn is_answered(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Single(_) => true,
            Self::Multi(indices) => !indices.is_empty(),
        }
    }
}

/// Wire representation of a non-null answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AnswerRepr {
    Single(usize),
    Multi(BTreeSet<usize>),
}

impl From<Option<AnswerRepr>> for Answer {
    fn from(repr: Option<AnswerRepr>) -> Self {
        match repr {
            None => Self::Empty,
            Some(AnswerRepr::Single(index)) => Self::Single(index),
            Some(AnswerRepr::Multi(indices)) => Self::Multi(indices),
        }
    }
}

impl From<Answer> for Option<AnswerRepr> {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Empty => None,
            Answer::Single(index) => Some(AnswerRepr::Single(index)),
            Answer::Multi(indices) => Some(AnswerRepr::Multi(indices)),
        }
    }
}

/// Returns the wire key for the question at `index`
pub fn answer_key(index: usize) -> String {
    format!("q{index}")
}

fn parse_answer_key(key: &str) -> Option<usize> {
    key.strip_prefix('q')?.parse().ok()
}

/// All answers of one student, keyed by canonical question index
///
/// Keys that do not look like `q<i>` are ignored when reading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Answer>", into = "BTreeMap<String, Answer>")]
pub struct Answers(BTreeMap<usize, Answer>);

impl Answers {
    /// Returns the answer to question `index`, if any was recorded
    pub fn get(&self, index: usize) -> Option<&Answer> {
        self.0.get(&index)
    }

    /// Records `answer` for question `index`, replacing any previous one
    pub fn set(&mut self, index: usize, answer: Answer) {
        self.0.insert(index, answer);
    }

    /// Removes and returns the answer to question `index`
    pub fn remove(&mut self, index: usize) -> Option<Answer> {
        self.0.remove(&index)
    }

    /// Merges `other` into `self`, field by field
    pub fn merge(&mut self, other: &Answers) {
        for (index, answer) in &other.0 {
            self.0.insert(*index, answer.clone());
        }
    }

    /// Number of questions with a non-empty answer
    pub fn answered_count(&self) -> usize {
        self.0.values().filter(|a| a.is_answered()).count()
    }

    /// Iterates over recorded answers in question order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Answer)> {
        self.0.iter().map(|(i, a)| (*i, a))
    }

    /// Whether no answer was recorded at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(usize, Answer)> for Answers {
    fn from_iter<T: IntoIterator<Item = (usize, Answer)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Answer>> for Answers {
    fn from(raw: BTreeMap<String, Answer>) -> Self {
        raw.into_iter()
            .filter_map(|(key, answer)| Some((parse_answer_key(&key)?, answer)))
            .collect()
    }
}

impl From<Answers> for BTreeMap<String, Answer> {
    fn from(answers: Answers) -> Self {
        answers
            .0
            .into_iter()
            .map(|(index, answer)| (answer_key(index), answer))
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answer_wire_values() {
        assert_eq!(serde_json::to_value(Answer::Empty).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(Answer::Single(2)).unwrap(), json!(2));
        assert_eq!(
            serde_json::to_value(Answer::multi([3, 1])).unwrap(),
            json!([1, 3])
        );
    }

    #[test]
    fn test_answer_from_wire() {
        let answer: Answer = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(answer, Answer::Empty);
        let answer: Answer = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(answer, Answer::Single(1));
        let answer: Answer = serde_json::from_value(json!([2, 1])).unwrap();
        assert_eq!(answer, Answer::multi([1, 2]));
    }

    #[test]
    fn test_answer_is_answered() {
        assert!(!Answer::Empty.is_answered());
        assert!(!Answer::Multi(BTreeSet::new()).is_answered());
        assert!(Answer::Single(0).is_answered());
        assert!(Answer::multi([0]).is_answered());
    }

    #[test]
    fn test_answers_keys() {
        let answers: Answers = [(0, Answer::Single(1)), (12, Answer::multi([2, 1]))]
            .into_iter()
            .collect();
        let value = serde_json::to_value(&answers).unwrap();
        assert_eq!(value, json!({ "q0": 1, "q12": [1, 2] }));
    }

    #[test]
    fn test_answers_ignore_foreign_keys() {
        let answers: Answers =
            serde_json::from_value(json!({ "q1": 0, "notes": 3, "qx": 1 })).unwrap();
        assert_eq!(answers.get(1), Some(&Answer::Single(0)));
        assert_eq!(answers.iter().count(), 1);
    }

    #[test]
    fn test_answers_answered_count() {
        let answers: Answers = [
            (0, Answer::Single(1)),
            (1, Answer::Empty),
            (2, Answer::Multi(BTreeSet::new())),
            (3, Answer::multi([0])),
        ]
        .into_iter()
        .collect();
        assert_eq!(answers.answered_count(), 2);
    }

    #[test]
    fn test_answers_merge_last_write_wins() {
        let mut answers: Answers = [(0, Answer::Single(1)), (1, Answer::Single(0))]
            .into_iter()
            .collect();
        let update: Answers = [(1, Answer::Single(2))].into_iter().collect();
        answers.merge(&update);
        assert_eq!(answers.get(0), Some(&Answer::Single(1)));
        assert_eq!(answers.get(1), Some(&Answer::Single(2)));
    }
}
