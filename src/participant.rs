//! Participant records, presence and submission
//!
//! Each student who joins a test owns one participant record. The record is
//! created on join, updated with partial merges as the student answers and
//! switches tabs, and latched to `Submitted` exactly once. This module holds
//! the record shapes, the pure rules for applying updates to them, the local
//! submission latch, and the [`Roster`] the teacher's monitor folds records
//! into.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay, skip_serializing_none};
use thiserror::Error;
use uuid::Uuid;
use web_time::SystemTime;

use crate::{join_code::JoinCode, order::QuestionOrder, quiz::Answers};

/// An opaque per-session student identifier
///
/// Generated on the student's device, stable only for that session.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct StudentId(Uuid);

impl StudentId {
    /// Creates a new random student ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A seed derived from the ID, for per-student deterministic shuffles
    pub fn seed(&self) -> u64 {
        self.0.as_u64_pair().0
    }
}

impl Default for StudentId {
    /// Creates a new random student ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for StudentId {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Presence of a student, as stored in `tabStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Presence {
    /// The test is in the foreground
    #[default]
    Active,
    /// The student switched away from the test
    #[serde(rename = "Out of Tab")]
    OutOfTab,
    /// Terminal, answers are final
    Submitted,
}

/// Presence collapsed for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum PresenceKind {
    /// Active or out of tab
    Active,
    /// Submitted
    Submitted,
}

impl Presence {
    /// Returns the counting bucket of this presence
    pub fn kind(self) -> PresenceKind {
        match self {
            Self::Active | Self::OutOfTab => PresenceKind::Active,
            Self::Submitted => PresenceKind::Submitted,
        }
    }

    /// The presence reported for a visibility signal
    pub fn from_visibility(visible: bool) -> Self {
        if visible { Self::Active } else { Self::OutOfTab }
    }
}

/// A participant record as stored under `tests/<code>/responses/<student>`
///
/// Wire shape: `{name, tabStatus, answers: {q<i>: …}, order: [int], testCode}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    /// Display name chosen on join
    #[serde(default)]
    pub name: String,
    /// Presence, `Active` when absent
    #[serde(default)]
    pub tab_status: Presence,
    /// Answers keyed by canonical question index
    #[serde(default)]
    pub answers: Answers,
    /// The student's question order
    #[serde(default)]
    pub order: QuestionOrder,
    /// The test this record belongs to
    pub test_code: JoinCode,
}

impl ParticipantRecord {
    /// Whether the record is latched to `Submitted`
    pub fn is_submitted(&self) -> bool {
        self.tab_status == Presence::Submitted
    }

    /// Applies a partial update
    ///
    /// # Errors
    ///
    /// Returns `Stale` if the record is already submitted and the patch would
    /// change its answers or presence. The record is left untouched.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), Stale> {
        if self.is_submitted() && (patch.tab_status.is_some() || patch.answers.is_some()) {
            return Err(Stale);
        }
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(tab_status) = patch.tab_status {
            self.tab_status = tab_status;
        }
        if let Some(answers) = &patch.answers {
            self.answers.merge(answers);
        }
        if let Some(order) = &patch.order {
            self.order.clone_from(order);
        }
        if let Some(test_code) = patch.test_code {
            self.test_code = test_code;
        }
        Ok(())
    }
}

/// A partial participant update, merged field by field
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// New display name
    pub name: Option<String>,
    /// New presence
    pub tab_status: Option<Presence>,
    /// Answers to merge in
    pub answers: Option<Answers>,
    /// Question order to store
    pub order: Option<QuestionOrder>,
    /// Owning test
    pub test_code: Option<JoinCode>,
}

impl Patch {
    /// A presence change
    pub fn presence(presence: Presence) -> Self {
        Self {
            tab_status: Some(presence),
            ..Self::default()
        }
    }

    /// An answers merge
    pub fn answers(answers: Answers) -> Self {
        Self {
            answers: Some(answers),
            ..Self::default()
        }
    }
}

/// A write that arrived after the record was submitted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("participant record is already submitted")]
pub struct Stale;

/// One-way latch guarding the submission of one client
///
/// Only the first call to [`SubmissionLatch::fire`] wins; every later call
/// reports that the latch was already set.
#[derive(Debug, Default)]
pub struct SubmissionLatch {
    fired_at: once_cell_serde::sync::OnceCell<SystemTime>,
}

impl SubmissionLatch {
    /// Sets the latch
    ///
    /// # Returns
    ///
    /// `true` for the call that set the latch, `false` for every later call
    pub fn fire(&self, at: SystemTime) -> bool {
        let mut won = false;
        self.fired_at.get_or_init(|| {
            won = true;
            at
        });
        won
    }

    /// Whether the latch is set
    pub fn is_set(&self) -> bool {
        self.fired_at.get().is_some()
    }

    /// When the latch was set
    pub fn fired_at(&self) -> Option<SystemTime> {
        self.fired_at.get().copied()
    }
}

/// Participant records of one test, indexed by presence
///
/// The reverse mapping lets the monitor count submitted and active
/// students without scanning every record.
#[derive(Debug, Default)]
pub struct Roster {
    /// Primary mapping from student ID to record
    mapping: HashMap<StudentId, ParticipantRecord>,

    /// Reverse mapping organized by presence
    reverse_mapping: EnumMap<PresenceKind, HashSet<StudentId>>,
}

impl FromIterator<(StudentId, ParticipantRecord)> for Roster {
    fn from_iter<T: IntoIterator<Item = (StudentId, ParticipantRecord)>>(iter: T) -> Self {
        let mut roster = Self::default();
        for (id, record) in iter {
            roster.upsert(id, record);
        }
        roster
    }
}

impl Roster {
    /// Inserts or replaces the record of `id`
    ///
    /// This properly moves the student between presence buckets if their
    /// presence changed.
    pub fn upsert(&mut self, id: StudentId, record: ParticipantRecord) {
        let new_kind = record.tab_status.kind();
        if let Some(old) = self.mapping.insert(id, record) {
            let old_kind = old.tab_status.kind();
            if old_kind != new_kind {
                self.reverse_mapping[old_kind].remove(&id);
            }
        }
        self.reverse_mapping[new_kind].insert(id);
    }

    /// Gets the number of students in a presence bucket
    pub fn specific_count(&self, kind: PresenceKind) -> usize {
        self.reverse_mapping[kind].len()
    }

    /// Iterates over the students in a presence bucket
    pub fn specific_iter(
        &self,
        kind: PresenceKind,
    ) -> impl Iterator<Item = (StudentId, &ParticipantRecord)> {
        self.reverse_mapping[kind]
            .iter()
            .filter_map(|id| Some((*id, self.mapping.get(id)?)))
    }

    /// Iterates over every record
    pub fn iter(&self) -> impl Iterator<Item = (StudentId, &ParticipantRecord)> {
        self.mapping.iter().map(|(id, record)| (*id, record))
    }

    /// Number of students
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no student has joined
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
