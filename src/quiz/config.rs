//! Authored tests and their stored form
//!
//! The teacher edits a [`Quiz`]. Publishing stamps it with ownership and
//! lifecycle fields, producing the [`TestRecord`] stored under the join code.
//! Students decode the very same document as a [`PublicTest`], which has no
//! answer key.

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::{TimestampMilliSeconds, serde_as, skip_serializing_none};
use web_time::{Duration, SystemTime};

use super::question::{PublicQuestion, Question, not_blank};
use crate::{identity::TeacherId, lifecycle::Status};

fn minutes(count: u32) -> Duration {
    Duration::from_secs(u64::from(count) * 60)
}

/// A test as authored by the teacher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Quiz {
    /// The title shown in the teacher's list and on the student screen
    #[garde(custom(not_blank), length(max = crate::constants::quiz::MAX_TITLE_LENGTH))]
    pub title: String,

    /// Time limit in minutes
    #[garde(range(
        min = crate::constants::quiz::MIN_DURATION_MINUTES,
        max = crate::constants::quiz::MAX_DURATION_MINUTES
    ))]
    pub duration: u32,

    /// The questions in canonical order
    #[garde(length(min = 1, max = crate::constants::quiz::MAX_QUESTION_COUNT), dive)]
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Returns the number of questions
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks if this test has no questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Returns the time limit as a duration
    pub fn time_limit(&self) -> Duration {
        minutes(self.duration)
    }

    /// Returns a copy with all free text trimmed
    pub fn trimmed(&self) -> Self {
        Self {
            title: self.title.trim().to_owned(),
            duration: self.duration,
            questions: self.questions.iter().map(Question::trimmed).collect(),
        }
    }
}

/// The canonical test document, as written by the teacher
///
/// Wire shape: `{title, duration, questions, teacherId, createdAt, status, startedAt?}`
/// with timestamps in milliseconds since the Unix epoch.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    /// The authored content
    #[serde(flatten)]
    pub quiz: Quiz,
    /// Owner of the test
    pub teacher_id: TeacherId,
    /// When the test was first published
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    /// Lifecycle state, `pending` when absent
    #[serde(default)]
    pub status: Status,
    /// Authoritative start instant, set once by `start`
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(default)]
    pub started_at: Option<SystemTime>,
}

/// The test document as seen by a student
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTest {
    /// The title of the test
    pub title: String,
    /// Time limit in minutes
    pub duration: u32,
    /// Questions in canonical order, without answer keys
    #[serde(default)]
    pub questions: Vec<PublicQuestion>,
    /// Lifecycle state, `pending` when absent
    #[serde(default)]
    pub status: Status,
    /// Authoritative start instant
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(default)]
    pub started_at: Option<SystemTime>,
}

impl PublicTest {
    /// Returns the time limit as a duration
    pub fn time_limit(&self) -> Duration {
        minutes(self.duration)
    }
}
