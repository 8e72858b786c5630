//! Question definitions
//!
//! A question offers an ordered list of options and records which of them
//! are correct. Students only ever see [`PublicQuestion`], the same question
//! without its answer key.

use std::collections::BTreeSet;

use garde::Validate;
use serde::{Deserialize, Serialize};

use super::answer::Answer;

type ValidationResult = garde::Result;

/// How a question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Exactly one option, shown as radio buttons
    #[default]
    #[serde(alias = "multiple")]
    Single,
    /// Any subset of options, shown as checkboxes
    #[serde(alias = "checkboxes")]
    Multi,
    /// Exactly one option, shown as a dropdown
    Dropdown,
}

impl QuestionKind {
    /// Whether answers to this kind are a set of options
    pub fn is_multi(self) -> bool {
        matches!(self, Self::Multi)
    }
}

/// The answer key of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    /// A single option index
    One(usize),
    /// A set of option indices
    Many(BTreeSet<usize>),
}

impl CorrectAnswer {
    /// Returns the correct option indices as a set
    pub fn indices(&self) -> BTreeSet<usize> {
        match self {
            Self::One(index) => BTreeSet::from([*index]),
            Self::Many(indices) => indices.clone(),
        }
    }
}

/// Rejects strings that are empty after trimming
pub(crate) fn not_blank<T: AsRef<str> + ?Sized>(value: &T, _: &()) -> ValidationResult {
    if value.as_ref().trim().is_empty() {
        Err(garde::Error::new("must not be blank"))
    } else {
        Ok(())
    }
}

/// Checks that the answer key fits the question kind and option count
fn correct_answer_fits<'a>(
    kind: &'a QuestionKind,
    options: &'a [String],
) -> impl FnOnce(&CorrectAnswer, &()) -> ValidationResult + 'a {
    move |correct, _| {
        match (kind, correct) {
            (QuestionKind::Single | QuestionKind::Dropdown, CorrectAnswer::Many(_)) => {
                return Err(garde::Error::new(
                    "single-answer questions need exactly one correct option",
                ));
            }
            (QuestionKind::Multi, CorrectAnswer::Many(indices)) if indices.is_empty() => {
                return Err(garde::Error::new("at least one option must be correct"));
            }
            _ => {}
        }
        match correct.indices().into_iter().find(|i| *i >= options.len()) {
            Some(index) => Err(garde::Error::new(format!(
                "correct option {index} is outside of the bounds [0,{})",
                options.len()
            ))),
            None => Ok(()),
        }
    }
}

/// A question as authored by the teacher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The question prompt
    #[garde(custom(not_blank), length(max = crate::constants::question::MAX_TEXT_LENGTH))]
    pub text: String,
    /// How the question is answered
    #[serde(rename = "type", default)]
    #[garde(skip)]
    pub kind: QuestionKind,
    /// The options in display order
    #[garde(
        length(
            min = crate::constants::question::MIN_OPTION_COUNT,
            max = crate::constants::question::MAX_OPTION_COUNT
        ),
        inner(custom(not_blank), length(max = crate::constants::question::MAX_OPTION_LENGTH))
    )]
    pub options: Vec<String>,
    /// The answer key
    #[garde(custom(correct_answer_fits(&self.kind, &self.options)))]
    pub correct_answer: CorrectAnswer,
    /// Whether the question is flagged as required
    #[serde(default)]
    #[garde(skip)]
    pub required: bool,
}

impl Question {
    /// Returns a copy with the prompt and options trimmed
    pub fn trimmed(&self) -> Self {
        Self {
            text: self.text.trim().to_owned(),
            options: self.options.iter().map(|o| o.trim().to_owned()).collect(),
            ..self.clone()
        }
    }

    /// Whether `answer` is exactly right
    ///
    /// Multi-select answers are compared as sets, so the order in which the
    /// options were ticked does not matter. A single index given for a
    /// multi-select question counts as a one-element set.
    pub fn is_correct(&self, answer: &Answer) -> bool {
        let selected = match (self.kind, answer) {
            (_, Answer::Empty) => return false,
            (_, Answer::Single(index)) => BTreeSet::from([*index]),
            (QuestionKind::Multi, Answer::Multi(indices)) => indices.clone(),
            (QuestionKind::Single | QuestionKind::Dropdown, Answer::Multi(_)) => return false,
        };
        self.correct_answer.indices() == selected
    }
}

/// A question as shown to students, without the answer key
///
/// Deserializing a stored question into this type drops `correctAnswer`,
/// so student-side code never holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    /// The question prompt
    pub text: String,
    /// How the question is answered
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    /// The options in display order
    pub options: Vec<String>,
    /// Whether the question is flagged as required
    #[serde(default)]
    pub required: bool,
}

impl PublicQuestion {
    /// Whether `answer` is a well-formed answer to this question
    pub fn accepts(&self, answer: &Answer) -> bool {
        let in_range = |i: &usize| *i < self.options.len();
        match answer {
            Answer::Empty => true,
            Answer::Single(index) => in_range(index),
            Answer::Multi(indices) => self.kind.is_multi() && indices.iter().all(in_range),
        }
    }
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        Self {
            text: question.text.clone(),
            kind: question.kind,
            options: question.options.clone(),
            required: question.required,
        }
    }
}
