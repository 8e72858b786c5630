//! Join code generation and parsing
//!
//! Students attach to a test by typing its join code, a 6-digit decimal
//! number assigned when the teacher first publishes the test. The code is
//! also the key of the test document.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::constants::join_code::{DIGITS, MAX_VALUE, MIN_VALUE};

/// The code students type to join a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinCode(u32);

/// Errors raised when parsing a join code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The input is not exactly six ASCII digits
    #[error("join code must be exactly six digits")]
    Format,
    /// The input starts with a zero
    #[error("join code is out of range")]
    OutOfRange,
}

impl JoinCode {
    /// Creates a join code drawn from the given generator
    pub fn from_rng(rng: &mut fastrand::Rng) -> Self {
        Self(rng.u32(MIN_VALUE..MAX_VALUE))
    }

    /// Returns the numeric value of the code
    pub fn value(self) -> u32 {
        self.0
    }
}

impl Display for JoinCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl TryFrom<u32> for JoinCode {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (MIN_VALUE..MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ParseError::OutOfRange)
        }
    }
}

impl FromStr for JoinCode {
    type Err = ParseError;

    /// Parses a join code, ignoring surrounding whitespace
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Format` unless the input is six ASCII digits, and
    /// `ParseError::OutOfRange` for codes with a leading zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::Format);
        }
        let value = s.parse::<u32>().map_err(|_| ParseError::Format)?;
        Self::try_from(value)
    }
}

impl Serialize for JoinCode {
    /// Serializes the join code as its 6-digit string
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for JoinCode {
    fn deserialize<D>(deserializer: D) -> Result<JoinCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        JoinCode::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}
