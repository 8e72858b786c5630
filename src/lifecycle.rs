//! Test lifecycle state machine
//!
//! A test moves through `pending → active → ended` and never backwards.
//! The transitions here are pure; [`crate::teacher::TeacherConsole`] applies
//! them to the stored document.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a test
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Published, students may join and wait
    #[default]
    #[display("pending")]
    Pending,
    /// Started, questions are revealed and the countdown runs
    #[display("active")]
    Active,
    /// Terminal, every remaining student is submitted
    #[display("ended")]
    Ended,
}

/// A teacher-initiated transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Transition {
    /// `pending → active`
    #[display("start")]
    Start,
    /// `active → ended`
    #[display("end")]
    End,
}

/// Result of applying a valid transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The status changes to the contained value
    Advance(Status),
    /// The test is already in the target state, nothing to write
    Unchanged,
}

/// Errors raised by invalid transitions
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transition is not allowed from the current status
    #[error("cannot {transition} a test that is {from}")]
    Invalid {
        /// Status the test is in
        from: Status,
        /// Transition that was attempted
        transition: Transition,
    },
}

impl Status {
    /// Applies `transition` to this status
    ///
    /// `start` is only valid from `pending`. `end` is valid from `active`
    /// and is an idempotent no-op from `ended`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for any other combination, in particular
    /// `start` on an active or ended test and `end` on a pending one.
    pub fn apply(self, transition: Transition) -> Result<Step, Error> {
        match (self, transition) {
            (Self::Pending, Transition::Start) => Ok(Step::Advance(Self::Active)),
            (Self::Active, Transition::End) => Ok(Step::Advance(Self::Ended)),
            (Self::Ended, Transition::End) => Ok(Step::Unchanged),
            (from, transition) => Err(Error::Invalid { from, transition }),
        }
    }

    /// Whether students may see the questions
    pub fn is_revealed(self) -> bool {
        matches!(self, Self::Active | Self::Ended)
    }
}
