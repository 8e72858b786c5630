//! Teacher identity
//!
//! Authentication is provided by an external identity provider. The core only
//! needs a stable identifier for the signed-in teacher, which is stamped onto
//! every published test and used to list that teacher's tests.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Stable identifier of a teacher account
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherId(String);

impl From<&str> for TeacherId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl TeacherId {
    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Source of the current teacher's identity
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in teacher
    fn teacher_id(&self) -> TeacherId;
}

/// An identity provider that always reports the same teacher
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub TeacherId);

impl IdentityProvider for StaticIdentity {
    fn teacher_id(&self) -> TeacherId {
        self.0.clone()
    }
}
