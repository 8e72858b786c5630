//! Per-student question order
//!
//! Each student sees the questions in their own shuffled order. The order is
//! generated once on first join, stored in the participant record, and reused
//! verbatim on every reconnect so question numbering stays stable.

use serde::{Deserialize, Serialize};

/// A source of shuffles
///
/// Implementations must produce a permutation of the input slice.
pub trait Shuffler {
    /// Shuffles `items` in place
    fn shuffle(&mut self, items: &mut [usize]);
}

impl Shuffler for fastrand::Rng {
    /// Fisher–Yates shuffle driven by this generator
    fn shuffle(&mut self, items: &mut [usize]) {
        fastrand::Rng::shuffle(self, items);
    }
}

/// A permutation of canonical question indices, in display order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionOrder(Vec<usize>);

/// Where an order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The stored order was valid and is reused
    Reused,
    /// A new order was generated
    Generated,
}

impl QuestionOrder {
    /// The identity order `0, 1, …, count - 1`
    pub fn identity(count: usize) -> Self {
        Self((0..count).collect())
    }

    /// Generates a fresh shuffled order of `count` questions
    pub fn generate<S: Shuffler + ?Sized>(count: usize, shuffler: &mut S) -> Self {
        let mut order = Self::identity(count);
        shuffler.shuffle(&mut order.0);
        order
    }

    /// Returns the stored order when it fits `count` questions, else a new one
    ///
    /// # Arguments
    ///
    /// * `existing` - The order found in the participant record, if any
    /// * `count` - The number of questions in the test
    /// * `shuffler` - Used only when a new order is needed
    pub fn resolve<S: Shuffler + ?Sized>(
        existing: Option<&QuestionOrder>,
        count: usize,
        shuffler: &mut S,
    ) -> (Self, Origin) {
        match existing {
            Some(order) if order.is_permutation_of(count) => (order.clone(), Origin::Reused),
            _ => (Self::generate(count, shuffler), Origin::Generated),
        }
    }

    /// Whether this is a permutation of `[0, count)`
    pub fn is_permutation_of(&self, count: usize) -> bool {
        if self.0.len() != count {
            return false;
        }
        let mut seen = vec![false; count];
        self.0
            .iter()
            .all(|&index| index < count && !std::mem::replace(&mut seen[index], true))
    }

    /// Iterates over canonical indices in display order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Number of questions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for QuestionOrder {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}
